//! Media characteristics detection
//!
//! Derives the physical write granularity of an SD card from its CSD
//! register and maps it onto the atomic-write capability flags the engine
//! uses to decide how much journaling safety it needs.
//!
//! CSD bit layout (bits of the 128-bit register, MSB = bit 127):
//! ```text
//! 127:126  CSD_STRUCTURE   0 = version 1.0 (standard capacity)
//!                          1 = version 2.0 (high / extended capacity)
//!  83:80   READ_BL_LEN     log2 of the read block length
//!  25:22   WRITE_BL_LEN    log2 of the write block length
//! ```
//!
//! The sector size is taken from WRITE_BL_LEN: the engine only cares about
//! the smallest unit that can be durably written in one operation.

use crate::driver::{CSD_LEN, DeviceMetadata};
use sdvfs_common::{BASE_SECTOR_SIZE, DeviceCharacteristics, Error, Result, VfsConfig};
use tracing::{debug, info, warn};

/// Sector sizes that map to an atomic-write flag
const ATOMIC_STEPS: [(u64, DeviceCharacteristics); 8] = [
    (BASE_SECTOR_SIZE, DeviceCharacteristics::ATOMIC512),
    (BASE_SECTOR_SIZE * 2, DeviceCharacteristics::ATOMIC1K),
    (BASE_SECTOR_SIZE * 4, DeviceCharacteristics::ATOMIC2K),
    (BASE_SECTOR_SIZE * 8, DeviceCharacteristics::ATOMIC4K),
    (BASE_SECTOR_SIZE * 16, DeviceCharacteristics::ATOMIC8K),
    (BASE_SECTOR_SIZE * 32, DeviceCharacteristics::ATOMIC16K),
    (BASE_SECTOR_SIZE * 64, DeviceCharacteristics::ATOMIC32K),
    (BASE_SECTOR_SIZE * 128, DeviceCharacteristics::ATOMIC64K),
];

/// Structure version of a CSD register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsdVersion {
    /// Standard capacity cards
    V1,
    /// High and extended capacity cards
    V2,
}

/// Raw CSD register, most significant byte first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Csd([u8; CSD_LEN]);

impl Csd {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; CSD_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; CSD_LEN] {
        &self.0
    }

    /// The raw CSD_STRUCTURE tag
    #[must_use]
    pub const fn structure(&self) -> u8 {
        self.0[0] >> 6
    }

    /// The structure version, if it is one of the known layouts
    #[must_use]
    pub const fn version(&self) -> Option<CsdVersion> {
        match self.structure() {
            0 => Some(CsdVersion::V1),
            1 => Some(CsdVersion::V2),
            _ => None,
        }
    }

    /// WRITE_BL_LEN split into the `(low, high)` nibble fields taken by
    /// [`decode_sector_size`].
    ///
    /// The register stores the exponent as two 2-bit fragments in bytes 12
    /// and 13. Both land in the low nibble; the high nibble field is
    /// always zero because no structure version defines bits for it.
    #[must_use]
    pub const fn write_block_len_fields(&self, version: CsdVersion) -> (u8, u8) {
        // Both structure versions keep WRITE_BL_LEN at bits 25:22.
        match version {
            CsdVersion::V1 | CsdVersion::V2 => {
                let high_bits = self.0[12] & 0x03;
                let low_bits = self.0[13] >> 6;
                ((high_bits << 2) | low_bits, 0x00)
            }
        }
    }
}

/// Convert the split sector-size exponent into a size in bytes.
///
/// The low four bits of the exponent come from `low`, the high four bits
/// from `high`. Returns `None` when `2^exponent` does not fit in a `u64`.
#[must_use]
pub const fn decode_sector_size(low: u8, high: u8) -> Option<u64> {
    let exponent = (high & 0xF0) | (low & 0x0F);
    1u64.checked_shl(exponent as u32)
}

/// Read the CSD from `device` and decode its sector size.
///
/// No retries: a failed read or an unknown structure version is returned
/// to the caller, who is expected to fall back to a configured size.
pub fn detect_from_device<D>(device: &mut D) -> Result<u64>
where
    D: DeviceMetadata + ?Sized,
{
    let csd = device
        .read_csd()
        .map(Csd::from_bytes)
        .map_err(|e| Error::device_metadata(format!("failed to read CSD: {e}")))?;

    let version = csd.version().ok_or_else(|| {
        Error::device_metadata(format!("unknown CSD structure {}", csd.structure()))
    })?;

    let (low, high) = csd.write_block_len_fields(version);
    let size = decode_sector_size(low, high).ok_or_else(|| {
        Error::device_metadata(format!("sector exponent out of range (low={low:#x}, high={high:#x})"))
    })?;

    debug!(?version, low, high, size, "decoded sector size from CSD");
    Ok(size)
}

/// Map a sector size to the flag asserting that a single-sector write is
/// atomic. Only 512 B .. 64 KiB in power-of-two steps qualify.
#[must_use]
pub fn assume_single_sector_atomic(sector_size: u64) -> Option<DeviceCharacteristics> {
    ATOMIC_STEPS
        .iter()
        .find(|(size, _)| *size == sector_size)
        .map(|(_, flag)| *flag)
}

/// Derive the atomic-write flag from the configured sector size.
///
/// Overwrites any previously configured device characteristics, so apply
/// it before manual overrides that should survive. Returns whether a
/// capability was asserted.
pub fn apply_single_sector_atomic(config: &mut VfsConfig) -> bool {
    match assume_single_sector_atomic(u64::from(config.sector_size())) {
        Some(flag) => {
            config.set_device_characteristics(flag);
            true
        }
        None => {
            config.reset_device_characteristics();
            false
        }
    }
}

/// Detect the sector size and store it in `config`.
///
/// On failure the configured sector size is left untouched.
pub fn configure_sector_size<D>(config: &mut VfsConfig, device: &mut D) -> Result<u64>
where
    D: DeviceMetadata + ?Sized,
{
    let detected = detect_from_device(device).and_then(|size| {
        u32::try_from(size)
            .map(|s| (size, s))
            .map_err(|_| Error::device_metadata(format!("sector size {size} too large")))
    });

    match detected {
        Ok((size, reported)) => {
            config.set_sector_size(reported);
            info!(sector_size = size, "sector size detected from card");
            Ok(size)
        }
        Err(e) => {
            warn!(
                error = %e,
                configured = config.sector_size(),
                "sector size detection failed, keeping configured value"
            );
            Err(e)
        }
    }
}

/// Sector size and atomic-write capability of a medium
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaCharacteristics {
    pub sector_size: u64,
    pub atomic: Option<DeviceCharacteristics>,
}

impl MediaCharacteristics {
    #[must_use]
    pub fn from_sector_size(sector_size: u64) -> Self {
        Self {
            sector_size,
            atomic: assume_single_sector_atomic(sector_size),
        }
    }

    /// Detect the characteristics of a card
    pub fn probe<D>(device: &mut D) -> Result<Self>
    where
        D: DeviceMetadata + ?Sized,
    {
        detect_from_device(device).map(Self::from_sector_size)
    }

    /// Capability flags to report, empty if nothing can be asserted
    #[must_use]
    pub fn device_characteristics(&self) -> DeviceCharacteristics {
        self.atomic.unwrap_or_else(DeviceCharacteristics::empty)
    }

    /// Store sector size and capabilities in `config`, replacing both
    pub fn apply(&self, config: &mut VfsConfig) -> Result<()> {
        let reported = u32::try_from(self.sector_size).map_err(|_| {
            Error::Configuration(format!("sector size {} too large", self.sector_size))
        })?;
        config.set_sector_size(reported);
        config.set_device_characteristics(self.device_characteristics());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct FakeCard {
        csd: io::Result<[u8; CSD_LEN]>,
        reads: usize,
    }

    impl FakeCard {
        fn with_write_bl_len(structure: u8, exponent: u8) -> Self {
            let mut csd = [0u8; CSD_LEN];
            csd[0] = structure << 6;
            csd[12] = 0xA8 | (exponent >> 2);
            csd[13] = 0x15 | ((exponent & 0x03) << 6);
            Self {
                csd: Ok(csd),
                reads: 0,
            }
        }

        fn failing() -> Self {
            Self {
                csd: Err(io::Error::other("card not responding")),
                reads: 0,
            }
        }
    }

    impl DeviceMetadata for FakeCard {
        fn read_csd(&mut self) -> io::Result<[u8; CSD_LEN]> {
            self.reads += 1;
            match &self.csd {
                Ok(csd) => Ok(*csd),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    #[test]
    fn test_decode_sector_size() {
        assert_eq!(decode_sector_size(0x01, 0x00), Some(2));
        assert_eq!(decode_sector_size(0x09, 0x00), Some(512));
        assert_eq!(decode_sector_size(0x0C, 0x00), Some(4096));
    }

    #[test]
    fn test_decode_masks_foreign_bits() {
        // Upper nibble of the low field and lower nibble of the high field
        // belong to neighbouring register fields.
        assert_eq!(decode_sector_size(0xF9, 0x0F), Some(512));
        assert_eq!(decode_sector_size(0x00, 0x10), Some(65536));
        assert_eq!(decode_sector_size(0x00, 0x40), None);
        assert_eq!(decode_sector_size(0x0F, 0x00), Some(32768));
    }

    #[test]
    fn test_detect_v1_and_v2() {
        let mut v1 = FakeCard::with_write_bl_len(0, 10);
        assert_eq!(detect_from_device(&mut v1).unwrap(), 1024);

        let mut v2 = FakeCard::with_write_bl_len(1, 9);
        assert_eq!(detect_from_device(&mut v2).unwrap(), 512);
    }

    #[test]
    fn test_detect_real_sdhc_csd() {
        let bytes = crate::driver::SysfsCsd::parse("400e00325b5900003b377f800a404000").unwrap();
        let csd = Csd::from_bytes(bytes);
        assert_eq!(csd.as_bytes(), &bytes);
        assert_eq!(csd.version(), Some(CsdVersion::V2));
        assert_eq!(csd.write_block_len_fields(CsdVersion::V2), (9, 0));
    }

    #[test]
    fn test_detect_unknown_version() {
        let mut card = FakeCard::with_write_bl_len(2, 9);
        let err = detect_from_device(&mut card).unwrap_err();
        assert!(matches!(err, Error::DeviceMetadata(_)));
    }

    #[test]
    fn test_detect_read_failure_no_retry() {
        let mut card = FakeCard::failing();
        assert!(detect_from_device(&mut card).is_err());
        assert_eq!(card.reads, 1);
    }

    #[test]
    fn test_assume_single_sector_atomic() {
        assert_eq!(
            assume_single_sector_atomic(512),
            Some(DeviceCharacteristics::ATOMIC512)
        );
        assert_eq!(
            assume_single_sector_atomic(4096),
            Some(DeviceCharacteristics::ATOMIC4K)
        );
        assert_eq!(
            assume_single_sector_atomic(65536),
            Some(DeviceCharacteristics::ATOMIC64K)
        );
        assert_eq!(assume_single_sector_atomic(700), None);
        assert_eq!(assume_single_sector_atomic(256), None);
        assert_eq!(assume_single_sector_atomic(131_072), None);
    }

    #[test]
    fn test_apply_single_sector_atomic_overwrites() {
        let mut config = VfsConfig::new();
        config.set_device_characteristics(DeviceCharacteristics::SAFE_APPEND);
        config.set_sector_size(1024);
        assert!(apply_single_sector_atomic(&mut config));
        assert_eq!(
            config.device_characteristics(),
            DeviceCharacteristics::ATOMIC1K
        );

        config.set_device_characteristics(DeviceCharacteristics::SAFE_APPEND);
        config.set_sector_size(700);
        assert!(!apply_single_sector_atomic(&mut config));
        assert!(config.device_characteristics().is_empty());
    }

    #[test]
    fn test_configure_sector_size_keeps_fallback() {
        let mut config = VfsConfig::new();
        config.set_sector_size(4096);

        let mut broken = FakeCard::failing();
        assert!(configure_sector_size(&mut config, &mut broken).is_err());
        assert_eq!(config.sector_size(), 4096);

        let mut card = FakeCard::with_write_bl_len(1, 9);
        assert_eq!(configure_sector_size(&mut config, &mut card).unwrap(), 512);
        assert_eq!(config.sector_size(), 512);
    }

    #[test]
    fn test_media_probe_and_apply() {
        let mut card = FakeCard::with_write_bl_len(0, 11);
        let media = MediaCharacteristics::probe(&mut card).unwrap();
        assert_eq!(media.sector_size, 2048);
        assert_eq!(media.atomic, Some(DeviceCharacteristics::ATOMIC2K));

        let mut config = VfsConfig::new();
        media.apply(&mut config).unwrap();
        assert_eq!(config.sector_size(), 2048);
        assert_eq!(
            config.device_characteristics(),
            DeviceCharacteristics::ATOMIC2K
        );
    }
}
