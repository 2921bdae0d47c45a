//! Request frames.
//!
//! Parameters are validated when a [`Request`] is built, so encoding itself cannot fail.

use bytes::{BufMut, BytesMut};
use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::error::{Error, Result};
use crate::led::color::{checked_channel, CustomColor, Rgbww};
use crate::led::function::{FunctionId, TransitionType};
use crate::packet::response::{ResponseKind, POWER_OFF, POWER_ON};
use crate::packet::{checksum, LOCALITY_LOCAL};

/// Number of color slots in a custom function frame.
pub const CUSTOM_FUNCTION_SLOTS: usize = 16;

/// Which channels an update color request applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSelection {
    Rgb,
    WarmCold,
    Both,
}

impl ColorSelection {
    fn code(self) -> u8 {
        match self {
            ColorSelection::Rgb => 0xF0,
            ColorSelection::WarmCold => 0x0F,
            ColorSelection::Both => 0xFF,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    SetPower {
        on: bool,
    },
    UpdateColor {
        color: Rgbww,
        selection: ColorSelection,
    },
    GetStatus,
    SetFunction {
        function: FunctionId,
        /// Wire value, already inverted.
        wire_speed: u8,
    },
    SetCustomFunction {
        slots: [CustomColor; CUSTOM_FUNCTION_SLOTS],
        /// Wire value, already inverted.
        wire_speed: u8,
        transition: TransitionType,
    },
    GetTime,
    SetTime {
        year: u8,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        weekday: u8,
    },
    GetTimers,
}

/// Converts a logical speed (0 slow, 255 fast) to the inverted wire byte.
pub fn wire_speed(speed: i32) -> Result<u8> {
    let speed = checked_channel("speed", speed)?;
    Ok(u8::MAX - speed)
}

impl Request {
    pub fn set_power(on: bool) -> Request {
        Request::SetPower { on }
    }

    pub fn update_rgbww(color: Rgbww) -> Request {
        Request::UpdateColor {
            color,
            selection: ColorSelection::Both,
        }
    }

    /// Only the color channels are applied, the white channels are sent as zero.
    pub fn update_rgb(red: u8, green: u8, blue: u8) -> Request {
        Request::UpdateColor {
            color: Rgbww {
                red,
                green,
                blue,
                ..Rgbww::default()
            },
            selection: ColorSelection::Rgb,
        }
    }

    /// Only the white channels are applied, the color channels are sent as zero.
    pub fn update_ww(warm_white: u8, cold_white: u8) -> Request {
        Request::UpdateColor {
            color: Rgbww {
                warm_white,
                cold_white,
                ..Rgbww::default()
            },
            selection: ColorSelection::WarmCold,
        }
    }

    pub fn set_function(function: FunctionId, speed: i32) -> Result<Request> {
        Ok(Request::SetFunction {
            function,
            wire_speed: wire_speed(speed)?,
        })
    }

    /// Unused slots are padded with [`CustomColor::FILLER`].
    pub fn set_custom_function(
        colors: &[CustomColor],
        speed: i32,
        transition: TransitionType,
    ) -> Result<Request> {
        if colors.is_empty() || colors.len() > CUSTOM_FUNCTION_SLOTS {
            return Err(Error::InvalidArgument(format!(
                "A custom function takes 1 to {} colors, got: {}",
                CUSTOM_FUNCTION_SLOTS,
                colors.len()
            )));
        }
        let mut slots = [CustomColor::FILLER; CUSTOM_FUNCTION_SLOTS];
        slots[..colors.len()].copy_from_slice(colors);
        Ok(Request::SetCustomFunction {
            slots,
            wire_speed: wire_speed(speed)?,
            transition,
        })
    }

    pub fn set_time(date_time: NaiveDateTime) -> Result<Request> {
        let year = u8::try_from(date_time.year() - 2000).map_err(|_| {
            Error::InvalidArgument(format!(
                "Year must be between 2000 and 2255, got: {}",
                date_time.year()
            ))
        })?;
        Ok(Request::SetTime {
            year,
            month: date_time.month() as u8,
            day: date_time.day() as u8,
            hour: date_time.hour() as u8,
            minute: date_time.minute() as u8,
            second: date_time.second() as u8,
            weekday: date_time.weekday().number_from_monday() as u8,
        })
    }

    /// The response kind the device answers with, `None` for fire-and-forget requests.
    pub fn expected_response(&self) -> Option<ResponseKind> {
        match self {
            Request::SetPower { .. } => Some(ResponseKind::SetPower),
            Request::GetStatus => Some(ResponseKind::Status),
            Request::GetTime => Some(ResponseKind::GetTime),
            Request::SetTime { .. } => Some(ResponseKind::SetTime),
            Request::GetTimers => Some(ResponseKind::GetTimer),
            Request::UpdateColor { .. }
            | Request::SetFunction { .. }
            | Request::SetCustomFunction { .. } => None,
        }
    }

    /// Fixed frame length of this request kind, checksum included.
    pub fn frame_len(&self) -> usize {
        match self {
            Request::SetPower { .. } | Request::GetStatus => 4,
            Request::SetFunction { .. } | Request::GetTime | Request::GetTimers => 5,
            Request::UpdateColor { .. } => 9,
            Request::SetTime { .. } => 12,
            Request::SetCustomFunction { .. } => 1 + CUSTOM_FUNCTION_SLOTS * 4 + 5,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.frame_len());
        match self {
            Request::SetPower { on } => {
                buf.put_u8(0x71);
                buf.put_u8(if *on { POWER_ON } else { POWER_OFF });
                buf.put_u8(LOCALITY_LOCAL);
            }
            Request::UpdateColor { color, selection } => {
                buf.put_u8(0x31);
                buf.put_slice(&color.channels());
                buf.put_u8(selection.code());
                buf.put_u8(LOCALITY_LOCAL);
            }
            Request::GetStatus => buf.put_slice(&[0x81, 0x8A, 0x8B]),
            Request::SetFunction {
                function,
                wire_speed,
            } => {
                buf.put_slice(&[0x61, function.code(), *wire_speed, LOCALITY_LOCAL]);
            }
            Request::SetCustomFunction {
                slots,
                wire_speed,
                transition,
            } => {
                buf.put_u8(0x51);
                for slot in slots {
                    buf.put_slice(&[slot.red, slot.green, slot.blue, slot.unknown]);
                }
                buf.put_slice(&[*wire_speed, transition.code(), 0xFF, LOCALITY_LOCAL]);
            }
            Request::GetTime => buf.put_slice(&[0x11, 0x1A, 0x1B, LOCALITY_LOCAL]),
            Request::SetTime {
                year,
                month,
                day,
                hour,
                minute,
                second,
                weekday,
            } => {
                buf.put_slice(&[
                    0x10,
                    0x14,
                    *year,
                    *month,
                    *day,
                    *hour,
                    *minute,
                    *second,
                    *weekday,
                    0x00,
                    LOCALITY_LOCAL,
                ]);
            }
            Request::GetTimers => buf.put_slice(&[0x22, 0x2A, 0x2B, LOCALITY_LOCAL]),
        }
        let sum = checksum(&buf);
        buf.put_u8(sum);
        debug_assert_eq!(buf.len(), self.frame_len());
        buf.to_vec()
    }
}
