//! The 2-bit section state code shared by setpoint and actual vectors.

/// One section's commanded-or-reported state. Encoded as a 2-bit field
/// wherever it crosses the wire (condensed work state process data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectionState {
    #[default]
    Off = 0,
    On = 1,
    Error = 2,
    NotInstalled = 3,
}

impl SectionState {
    pub fn is_on(self) -> bool {
        matches!(self, SectionState::On)
    }
}

impl From<bool> for SectionState {
    fn from(on: bool) -> Self {
        if on { SectionState::On } else { SectionState::Off }
    }
}

impl From<u8> for SectionState {
    fn from(bits: u8) -> Self {
        match bits & 0b11 {
            0 => SectionState::Off,
            1 => SectionState::On,
            2 => SectionState::Error,
            _ => SectionState::NotInstalled,
        }
    }
}

impl From<SectionState> for u8 {
    fn from(s: SectionState) -> Self {
        s as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_two_bits() {
        for raw in 0u8..4 {
            let s = SectionState::from(raw);
            assert_eq!(u8::from(s), raw);
        }
    }

    #[test]
    fn masks_extra_high_bits() {
        assert_eq!(SectionState::from(0b1111_1101u8), SectionState::On);
    }
}
