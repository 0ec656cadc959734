// The PCSM takes a 5-bit raw performance identifier (16..=31). The logical
// scale 0..=15 orders those identifiers from slowest to fastest.

/// Raw PCSM identifier for each logical level.
pub const PERF_TO_RAW: [u8; 16] = [
    28, 24, 29, 20, 30, 25, 31, 16, 26, 21, 27, 22, 17, 23, 18, 19,
];

/// Marks raw identifiers that are not a valid level.
pub const INVALID_PERF: u8 = 128;

/// Logical level for each raw PCSM identifier.
pub const RAW_TO_PERF: [u8; 32] = [
    INVALID_PERF, INVALID_PERF, INVALID_PERF, INVALID_PERF,
    INVALID_PERF, INVALID_PERF, INVALID_PERF, INVALID_PERF,
    INVALID_PERF, INVALID_PERF, INVALID_PERF, INVALID_PERF,
    INVALID_PERF, INVALID_PERF, INVALID_PERF, INVALID_PERF,
    7, 12, 14, 15, 3, 9, 11, 13,
    1, 5, 8, 10, 0, 2, 4, 6,
];

pub const RAW_PERF_MIN: u8 = 16;
pub const RAW_PERF_MAX: u8 = 31;

/// A DVFS performance level, 0 (lowest power) to 15 (fastest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PerfLevel(u8);

#[cfg(feature = "defmt")]
impl defmt::Format for PerfLevel {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "P{}", self.0)
    }
}

impl PerfLevel {
    pub const MIN: PerfLevel = PerfLevel(0);
    pub const MAX: PerfLevel = PerfLevel(15);

    pub const fn new(level: u8) -> Option<Self> {
        if level <= Self::MAX.0 {
            Some(PerfLevel(level))
        } else {
            None
        }
    }

    /// Decode a raw PCSM identifier.
    pub const fn from_raw(raw: u8) -> Option<Self> {
        if raw as usize >= RAW_TO_PERF.len() {
            return None;
        }
        match RAW_TO_PERF[raw as usize] {
            INVALID_PERF => None,
            level => Some(PerfLevel(level)),
        }
    }

    pub const fn level(self) -> u8 {
        self.0
    }

    /// Raw PCSM identifier for this level.
    pub const fn raw(self) -> u8 {
        PERF_TO_RAW[self.0 as usize]
    }
}

impl TryFrom<u8> for PerfLevel {
    type Error = u8;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        PerfLevel::new(level).ok_or(level)
    }
}

pub const fn is_valid_raw(raw: u8) -> bool {
    raw >= RAW_PERF_MIN && raw <= RAW_PERF_MAX
}
