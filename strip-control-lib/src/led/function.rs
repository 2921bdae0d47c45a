use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Built-in effects of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum FunctionId {
    SevenColorCrossFade,
    RedGradualChange,
    GreenGradualChange,
    BlueGradualChange,
    YellowGradualChange,
    CyanGradualChange,
    PurpleGradualChange,
    WhiteGradualChange,
    RedGreenCrossFade,
    RedBlueCrossFade,
    GreenBlueCrossFade,
    SevenColorStrobeFlash,
    RedStrobeFlash,
    GreenStrobeFlash,
    BlueStrobeFlash,
    YellowStrobeFlash,
    CyanStrobeFlash,
    PurpleStrobeFlash,
    WhiteStrobeFlash,
    SevenColorJumpingChange,
    NoFunction,
}

impl FunctionId {
    pub const ALL: [FunctionId; 21] = [
        FunctionId::SevenColorCrossFade,
        FunctionId::RedGradualChange,
        FunctionId::GreenGradualChange,
        FunctionId::BlueGradualChange,
        FunctionId::YellowGradualChange,
        FunctionId::CyanGradualChange,
        FunctionId::PurpleGradualChange,
        FunctionId::WhiteGradualChange,
        FunctionId::RedGreenCrossFade,
        FunctionId::RedBlueCrossFade,
        FunctionId::GreenBlueCrossFade,
        FunctionId::SevenColorStrobeFlash,
        FunctionId::RedStrobeFlash,
        FunctionId::GreenStrobeFlash,
        FunctionId::BlueStrobeFlash,
        FunctionId::YellowStrobeFlash,
        FunctionId::CyanStrobeFlash,
        FunctionId::PurpleStrobeFlash,
        FunctionId::WhiteStrobeFlash,
        FunctionId::SevenColorJumpingChange,
        FunctionId::NoFunction,
    ];

    /// The byte sent on the wire.
    pub fn code(self) -> u8 {
        match self {
            FunctionId::NoFunction => 0x61,
            // The effects 0x25..=0x38 are contiguous and in declaration order.
            other => 0x25 + other as u8,
        }
    }

    pub fn from_code(code: u8) -> Option<FunctionId> {
        FunctionId::ALL.iter().copied().find(|f| f.code() == code)
    }
}

impl FromStr for FunctionId {
    type Err = anyhow::Error;

    /// Accepts the kebab-case name (`red-gradual-change`) or the
    /// screaming-snake name (`RED_GRADUAL_CHANGE`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        <FunctionId as ValueEnum>::from_str(&normalized, true)
            .map_err(|_| anyhow!("Invalid function: {}", s))
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => write!(f, "{}", value.get_name()),
            None => write!(f, "{:?}", self),
        }
    }
}

/// How a custom function moves from one color slot to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum TransitionType {
    Gradual,
    Jumping,
    Strobe,
}

impl TransitionType {
    pub fn code(self) -> u8 {
        match self {
            TransitionType::Gradual => 0x3A,
            TransitionType::Jumping => 0x3B,
            TransitionType::Strobe => 0x3C,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_function_codes_unique() {
        let codes: HashSet<u8> = FunctionId::ALL.iter().map(|f| f.code()).collect();
        assert_eq!(codes.len(), FunctionId::ALL.len());
    }

    #[test]
    fn test_function_code_values() {
        assert_eq!(FunctionId::SevenColorCrossFade.code(), 0x25);
        assert_eq!(FunctionId::GreenBlueCrossFade.code(), 0x2F);
        assert_eq!(FunctionId::SevenColorStrobeFlash.code(), 0x30);
        assert_eq!(FunctionId::SevenColorJumpingChange.code(), 0x38);
        assert_eq!(FunctionId::NoFunction.code(), 0x61);
    }

    #[test]
    fn test_function_from_code_roundtrip() {
        for function in FunctionId::ALL {
            assert_eq!(FunctionId::from_code(function.code()), Some(function));
        }
        assert_eq!(FunctionId::from_code(0x24), None);
    }

    #[test]
    fn test_function_from_name() {
        assert_eq!(
            "RED_GRADUAL_CHANGE".parse::<FunctionId>().unwrap(),
            FunctionId::RedGradualChange
        );
        assert_eq!(
            "seven-color-cross-fade".parse::<FunctionId>().unwrap(),
            FunctionId::SevenColorCrossFade
        );
        assert!("invalid".parse::<FunctionId>().is_err());
        assert_eq!(FunctionId::NoFunction.to_string(), "no-function");
    }
}
