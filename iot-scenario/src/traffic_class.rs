//! Traffic classes and the one-octet tag identifying them on the air

use std::fmt::{Display, Formatter};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum TrafficClass {
    Normal,
    Malicious,
    Interfering,
}

impl TrafficClass {
    pub fn tag(&self) -> u8 {
        match self {
            TrafficClass::Normal => 0,
            TrafficClass::Malicious => 1,
            TrafficClass::Interfering => 2,
        }
    }

    /// Classifies a received packet by its tag
    ///
    /// Untagged packets are normal traffic, and unknown tag values are treated as interference.
    pub fn from_tag(tag: Option<u8>) -> Self {
        match tag {
            None | Some(0) => TrafficClass::Normal,
            Some(1) => TrafficClass::Malicious,
            Some(_) => TrafficClass::Interfering,
        }
    }

    /// The label written to the packet logs
    pub fn label(&self) -> &'static str {
        match self {
            TrafficClass::Normal => "Normal",
            TrafficClass::Malicious => "Malicioso",
            TrafficClass::Interfering => "Interferente",
        }
    }
}

impl Display for TrafficClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        for class in [
            TrafficClass::Normal,
            TrafficClass::Malicious,
            TrafficClass::Interfering,
        ] {
            assert_eq!(TrafficClass::from_tag(Some(class.tag())), class);
        }
    }

    #[test]
    fn test_missing_tag_defaults_to_normal() {
        assert_eq!(TrafficClass::from_tag(None), TrafficClass::Normal);
        assert_eq!(TrafficClass::from_tag(None).label(), "Normal");
    }

    #[test]
    fn test_unknown_tag_is_interference() {
        assert_eq!(TrafficClass::from_tag(Some(7)), TrafficClass::Interfering);
        assert_eq!(TrafficClass::Interfering.to_string(), "Interferente");
    }
}
