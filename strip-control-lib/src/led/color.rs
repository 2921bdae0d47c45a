use std::str::FromStr;

use anyhow::anyhow;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Validates a single channel value and narrows it to a wire byte.
pub fn checked_channel(name: &str, value: i32) -> Result<u8> {
    u8::try_from(value).map_err(|_| {
        Error::InvalidArgument(format!(
            "Invalid {} value! Expected 0-255, got: {}",
            name, value
        ))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RGB {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl RGB {
    pub fn new(red: i32, green: i32, blue: i32) -> Result<Self> {
        Ok(RGB {
            red: checked_channel("red", red)?,
            green: checked_channel("green", green)?,
            blue: checked_channel("blue", blue)?,
        })
    }
}

impl From<(u8, u8, u8)> for RGB {
    fn from((red, green, blue): (u8, u8, u8)) -> Self {
        RGB { red, green, blue }
    }
}

impl From<RGB> for (u8, u8, u8) {
    fn from(rgb: RGB) -> Self {
        (rgb.red, rgb.green, rgb.blue)
    }
}

/// Red, green, blue, warm white and cold white channel intensities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgbww {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub warm_white: u8,
    pub cold_white: u8,
}

impl Rgbww {
    pub fn new(red: i32, green: i32, blue: i32, warm_white: i32, cold_white: i32) -> Result<Self> {
        Ok(Rgbww {
            red: checked_channel("red", red)?,
            green: checked_channel("green", green)?,
            blue: checked_channel("blue", blue)?,
            warm_white: checked_channel("warm_white", warm_white)?,
            cold_white: checked_channel("cold_white", cold_white)?,
        })
    }

    pub fn channels(&self) -> [u8; 5] {
        [
            self.red,
            self.green,
            self.blue,
            self.warm_white,
            self.cold_white,
        ]
    }

    /// Mean of all five channels. The device has no brightness of its own, so this is
    /// computed on the client.
    pub fn brightness(&self) -> u8 {
        let sum: u32 = self.channels().iter().map(|&c| c as u32).sum();
        (sum / 5) as u8
    }
}

/// One slot of a custom function.
///
/// The purpose of the fourth byte is unknown; the official app sends zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub unknown: u8,
}

impl CustomColor {
    /// Filler for the unused slots of a custom function.
    pub const FILLER: CustomColor = CustomColor {
        red: 1,
        green: 2,
        blue: 3,
        unknown: 0,
    };

    /// Builds a slot from `(r, g, b)` or `(r, g, b, unknown)`.
    pub fn from_channels(channels: &[i32]) -> Result<Self> {
        let unknown = match channels.len() {
            3 => 0,
            4 => checked_channel("unknown", channels[3])?,
            n => {
                return Err(Error::InvalidArgument(format!(
                    "Invalid amount of colors in color tuple. Expected 3 or 4, got: {}",
                    n
                )))
            }
        };
        Ok(CustomColor {
            red: checked_channel("red", channels[0])?,
            green: checked_channel("green", channels[1])?,
            blue: checked_channel("blue", channels[2])?,
            unknown,
        })
    }
}

impl From<RGB> for CustomColor {
    fn from(rgb: RGB) -> Self {
        CustomColor {
            red: rgb.red,
            green: rgb.green,
            blue: rgb.blue,
            unknown: 0,
        }
    }
}

impl FromStr for CustomColor {
    type Err = anyhow::Error;

    /// Parses `r,g,b` or `r,g,b,x`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let channels = s
            .split(',')
            .map(|part| part.trim().parse::<i32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| anyhow!("Invalid color '{}': {}", s, e))?;
        Ok(CustomColor::from_channels(&channels)?)
    }
}

/// Named colors for the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliColors {
    Red,
    Green,
    Blue,
    Yellow,
    Orange,
    Purple,
    Cyan,
    Magenta,
    Pink,
    Teal,
    White,
}

impl From<CliColors> for RGB {
    fn from(color: CliColors) -> Self {
        let rgb = match color {
            CliColors::Red => (255, 0, 0),
            CliColors::Green => (0, 255, 0),
            CliColors::Blue => (0, 0, 255),
            CliColors::Yellow => (255, 255, 0),
            CliColors::Orange => (255, 165, 0),
            CliColors::Purple => (128, 0, 128),
            CliColors::Cyan => (0, 255, 255),
            CliColors::Magenta => (255, 0, 255),
            CliColors::Pink => (255, 192, 203),
            CliColors::Teal => (0, 128, 128),
            CliColors::White => (255, 255, 255),
        };
        rgb.into()
    }
}
