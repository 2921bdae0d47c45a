//! Response frames.
//!
//! Each response kind is identified by the first two bytes of its frame and has a
//! fixed length. The mapping lives in a static table consulted by the frame reader
//! before the remainder of a frame is read.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};
use chrono::{NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::led::color::Rgbww;
use crate::util::traits::WireFrame;

/// Power status byte meaning "on".
pub const POWER_ON: u8 = 0x23;
/// Power status byte meaning "off".
pub const POWER_OFF: u8 = 0x24;

/// Timer slot marker meaning "enabled".
pub const TIMER_ACTIVE: u8 = 0xF0;

/// Number of timer slots reported by the device.
pub const TIMER_SLOTS: usize = 6;
const TIMER_SLOT_LENGTH: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResponseKind {
    Status,
    SetTime,
    GetTime,
    GetTimer,
    SetPower,
}

impl ResponseKind {
    pub const ALL: [ResponseKind; 5] = [
        ResponseKind::Status,
        ResponseKind::SetTime,
        ResponseKind::GetTime,
        ResponseKind::GetTimer,
        ResponseKind::SetPower,
    ];

    /// Packet id and sub id that start every frame of this kind.
    pub fn prefix(self) -> [u8; 2] {
        match self {
            ResponseKind::Status => [0x81, 0x25],
            ResponseKind::SetTime => [0x0F, 0x10],
            ResponseKind::GetTime => [0x0F, 0x11],
            ResponseKind::GetTimer => [0x0F, 0x22],
            ResponseKind::SetPower => [0x0F, 0x71],
        }
    }

    /// Total frame length, checksum included.
    pub fn frame_len(self) -> usize {
        match self {
            ResponseKind::Status => StatusResponse::LENGTH,
            ResponseKind::SetTime => SetTimeResponse::LENGTH,
            ResponseKind::GetTime => GetTimeResponse::LENGTH,
            ResponseKind::GetTimer => GetTimerResponse::LENGTH,
            ResponseKind::SetPower => SetPowerResponse::LENGTH,
        }
    }

    /// Resolves a frame prefix through the response table.
    pub fn from_prefix(prefix: [u8; 2]) -> Result<ResponseKind> {
        RESPONSE_TABLE
            .get(&prefix)
            .copied()
            .ok_or(Error::UnknownResponseType(prefix[0], prefix[1]))
    }
}

lazy_static! {
    static ref RESPONSE_TABLE: HashMap<[u8; 2], ResponseKind> = {
        let mut table = HashMap::new();
        for kind in ResponseKind::ALL {
            let previous = table.insert(kind.prefix(), kind);
            assert!(
                previous.is_none(),
                "response prefix {:?} is shared by {:?} and {:?}",
                kind.prefix(),
                previous,
                kind
            );
        }
        table
    };
}

/// A decoded response of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Response {
    Status(StatusResponse),
    SetTime(SetTimeResponse),
    GetTime(GetTimeResponse),
    GetTimer(GetTimerResponse),
    SetPower(SetPowerResponse),
}

impl Response {
    pub fn kind(&self) -> ResponseKind {
        match self {
            Response::Status(_) => ResponseKind::Status,
            Response::SetTime(_) => ResponseKind::SetTime,
            Response::GetTime(_) => ResponseKind::GetTime,
            Response::GetTimer(_) => ResponseKind::GetTimer,
            Response::SetPower(_) => ResponseKind::SetPower,
        }
    }

    /// Decodes a complete frame, dispatching on its prefix.
    pub fn decode(bytes: &[u8]) -> Result<Response> {
        if bytes.len() < 2 {
            return Err(Error::InvalidLength {
                expected: 2,
                actual: bytes.len(),
            });
        }
        let kind = ResponseKind::from_prefix([bytes[0], bytes[1]])?;
        Self::decode_as(kind, bytes)
    }

    /// Decodes a complete frame as the given kind.
    pub fn decode_as(kind: ResponseKind, bytes: &[u8]) -> Result<Response> {
        Ok(match kind {
            ResponseKind::Status => Response::Status(StatusResponse::from_frame(bytes)?),
            ResponseKind::SetTime => Response::SetTime(SetTimeResponse::from_frame(bytes)?),
            ResponseKind::GetTime => Response::GetTime(GetTimeResponse::from_frame(bytes)?),
            ResponseKind::GetTimer => Response::GetTimer(GetTimerResponse::from_frame(bytes)?),
            ResponseKind::SetPower => Response::SetPower(SetPowerResponse::from_frame(bytes)?),
        })
    }

    /// Encodes the response back into its wire form.
    pub fn to_frame(&self) -> Vec<u8> {
        match self {
            Response::Status(r) => r.to_frame(),
            Response::SetTime(r) => r.to_frame(),
            Response::GetTime(r) => r.to_frame(),
            Response::GetTimer(r) => r.to_frame(),
            Response::SetPower(r) => r.to_frame(),
        }
    }
}

/// Reply to a status request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub packet_id: u8,
    pub device_name: u8,
    pub power_status: u8,
    pub mode: u8,
    pub run_status: u8,
    /// Speed as reported by the device, not inverted.
    pub speed: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub warm_white: u8,
    pub unknown1: u8,
    pub cold_white: u8,
    pub unknown2: u8,
}

impl StatusResponse {
    pub fn is_on(&self) -> bool {
        self.power_status == POWER_ON
    }

    pub fn rgbww(&self) -> Rgbww {
        Rgbww {
            red: self.red,
            green: self.green,
            blue: self.blue,
            warm_white: self.warm_white,
            cold_white: self.cold_white,
        }
    }
}

impl WireFrame for StatusResponse {
    const LENGTH: usize = 14;

    fn write_fields(&self, buf: &mut BytesMut) {
        buf.put_slice(&[
            self.packet_id,
            self.device_name,
            self.power_status,
            self.mode,
            self.run_status,
            self.speed,
            self.red,
            self.green,
            self.blue,
            self.warm_white,
            self.unknown1,
            self.cold_white,
            self.unknown2,
        ]);
    }

    fn read_fields(b: &[u8]) -> Self {
        StatusResponse {
            packet_id: b[0],
            device_name: b[1],
            power_status: b[2],
            mode: b[3],
            run_status: b[4],
            speed: b[5],
            red: b[6],
            green: b[7],
            blue: b[8],
            warm_white: b[9],
            unknown1: b[10],
            cold_white: b[11],
            unknown2: b[12],
        }
    }
}

/// Acknowledgement of a set time request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SetTimeResponse {
    pub packet_id: u8,
    pub sub_id: u8,
    pub result: u8,
}

impl SetTimeResponse {
    pub fn is_success(&self) -> bool {
        self.result == 0x00
    }
}

impl WireFrame for SetTimeResponse {
    const LENGTH: usize = 4;

    fn write_fields(&self, buf: &mut BytesMut) {
        buf.put_slice(&[self.packet_id, self.sub_id, self.result]);
    }

    fn read_fields(b: &[u8]) -> Self {
        SetTimeResponse {
            packet_id: b[0],
            sub_id: b[1],
            result: b[2],
        }
    }
}

/// The device clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GetTimeResponse {
    pub packet_id: u8,
    pub sub_id: u8,
    pub unknown1: u8,
    /// Years since 2000.
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub dayofweek: u8,
    pub unknown2: u8,
}

impl GetTimeResponse {
    /// The clock as a calendar time, `None` if the device reports an impossible date.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2000 + self.year as i32, self.month as u32, self.day as u32)?
            .and_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
    }
}

impl WireFrame for GetTimeResponse {
    const LENGTH: usize = 12;

    fn write_fields(&self, buf: &mut BytesMut) {
        buf.put_slice(&[
            self.packet_id,
            self.sub_id,
            self.unknown1,
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.dayofweek,
            self.unknown2,
        ]);
    }

    fn read_fields(b: &[u8]) -> Self {
        GetTimeResponse {
            packet_id: b[0],
            sub_id: b[1],
            unknown1: b[2],
            year: b[3],
            month: b[4],
            day: b[5],
            hour: b[6],
            minute: b[7],
            second: b[8],
            dayofweek: b[9],
            unknown2: b[10],
        }
    }
}

/// One of the timer slots stored on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimerSlot {
    pub is_active: u8,
    /// Years since 2000.
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Bitmask of the weekdays a repeating timer fires on.
    pub dayofweek: u8,
    pub action_code: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub warm_white: u8,
    pub cold_white: u8,
}

impl TimerSlot {
    pub fn is_active(&self) -> bool {
        self.is_active == TIMER_ACTIVE
    }

    /// Execution time for one-shot timers. Repeating timers carry no date and yield `None`.
    pub fn execution_time(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2000 + self.year as i32, self.month as u32, self.day as u32)?
            .and_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
    }

    pub fn rgbww(&self) -> Rgbww {
        Rgbww {
            red: self.red,
            green: self.green,
            blue: self.blue,
            warm_white: self.warm_white,
            cold_white: self.cold_white,
        }
    }

    fn to_bytes(self) -> [u8; TIMER_SLOT_LENGTH] {
        [
            self.is_active,
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.dayofweek,
            self.action_code,
            self.red,
            self.green,
            self.blue,
            self.warm_white,
            self.cold_white,
        ]
    }

    fn from_bytes(b: &[u8]) -> Self {
        TimerSlot {
            is_active: b[0],
            year: b[1],
            month: b[2],
            day: b[3],
            hour: b[4],
            minute: b[5],
            second: b[6],
            dayofweek: b[7],
            action_code: b[8],
            red: b[9],
            green: b[10],
            blue: b[11],
            warm_white: b[12],
            cold_white: b[13],
        }
    }
}

/// All timer slots of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GetTimerResponse {
    pub packet_id: u8,
    pub sub_id: u8,
    pub timers: [TimerSlot; TIMER_SLOTS],
    pub unknown: u8,
}

impl WireFrame for GetTimerResponse {
    const LENGTH: usize = 2 + TIMER_SLOTS * TIMER_SLOT_LENGTH + 2;

    fn write_fields(&self, buf: &mut BytesMut) {
        buf.put_u8(self.packet_id);
        buf.put_u8(self.sub_id);
        for timer in &self.timers {
            buf.put_slice(&timer.to_bytes());
        }
        buf.put_u8(self.unknown);
    }

    fn read_fields(b: &[u8]) -> Self {
        let mut timers = [TimerSlot::default(); TIMER_SLOTS];
        for (slot, chunk) in timers
            .iter_mut()
            .zip(b[2..2 + TIMER_SLOTS * TIMER_SLOT_LENGTH].chunks_exact(TIMER_SLOT_LENGTH))
        {
            *slot = TimerSlot::from_bytes(chunk);
        }
        GetTimerResponse {
            packet_id: b[0],
            sub_id: b[1],
            timers,
            unknown: b[Self::LENGTH - 2],
        }
    }
}

/// Acknowledgement of a power change, carrying the new power status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SetPowerResponse {
    pub packet_id: u8,
    pub sub_id: u8,
    pub power_status: u8,
}

impl SetPowerResponse {
    pub fn is_on(&self) -> bool {
        self.power_status == POWER_ON
    }
}

impl WireFrame for SetPowerResponse {
    const LENGTH: usize = 4;

    fn write_fields(&self, buf: &mut BytesMut) {
        buf.put_slice(&[self.packet_id, self.sub_id, self.power_status]);
    }

    fn read_fields(b: &[u8]) -> Self {
        SetPowerResponse {
            packet_id: b[0],
            sub_id: b[1],
            power_status: b[2],
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::packet::validate;

    pub(crate) fn sample_status() -> StatusResponse {
        StatusResponse {
            packet_id: 0x81,
            device_name: 0x25,
            power_status: POWER_ON,
            mode: 0x61,
            run_status: 0x21,
            speed: 5,
            red: 0,
            green: 0,
            blue: 0,
            warm_white: 255,
            unknown1: 1,
            cold_white: 255,
            unknown2: 255,
        }
    }

    pub(crate) fn sample_time() -> GetTimeResponse {
        GetTimeResponse {
            packet_id: 0x0F,
            sub_id: 0x11,
            unknown1: 0x14,
            year: 24,
            month: 3,
            day: 17,
            hour: 21,
            minute: 5,
            second: 42,
            dayofweek: 7,
            unknown2: 0,
        }
    }

    fn sample_timers() -> GetTimerResponse {
        let mut timers = [TimerSlot::default(); TIMER_SLOTS];
        timers[0] = TimerSlot {
            is_active: TIMER_ACTIVE,
            year: 24,
            month: 12,
            day: 24,
            hour: 18,
            minute: 30,
            second: 0,
            dayofweek: 0,
            action_code: 0x61,
            red: 255,
            green: 10,
            blue: 0,
            warm_white: 0,
            cold_white: 0,
        };
        timers[3].is_active = 0x0F;
        timers[3].dayofweek = 0b0111_1110;
        GetTimerResponse {
            packet_id: 0x0F,
            sub_id: 0x22,
            timers,
            unknown: 0,
        }
    }

    #[test]
    fn test_parse_known_status_frame() {
        let data = b"\x81\x25\x23\x61\x21\x05\x00\x00\x00\xff\x01\xff\xff\x4e";
        assert!(validate(data));
        let response = Response::decode(data).unwrap();
        assert_eq!(response, Response::Status(sample_status()));
    }

    #[test]
    fn test_parse_captured_status_frames() {
        let frames: [&[u8]; 3] = [
            b"\x81%#a!\x05\xff\xff\xff\xff\x01\xff\xffK",
            b"\x81%#a!\x0f\x00\x00\x00\xff\x01\xff\x0fh",
            b"\x81%#a!\x0f\x00\x00\x00\x00\x01\x00\xffZ",
        ];
        for frame in frames {
            match Response::decode(frame).unwrap() {
                Response::Status(status) => assert!(status.is_on()),
                other => panic!("unexpected response {:?}", other),
            }
        }
    }

    #[test]
    fn test_corrupted_checksum_is_rejected() {
        let data = b"\x81\x25\x23\x61\x21\x05\x00\x00\x00\xff\x01\xff\xff\x4f";
        match Response::decode(data) {
            Err(Error::ChecksumMismatch { expected, actual }) => {
                assert_eq!(expected, 0x4e);
                assert_eq!(actual, 0x4f);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_unknown_prefix_is_rejected() {
        assert!(matches!(
            Response::decode(&[0x42, 0x42, 0x84]),
            Err(Error::UnknownResponseType(0x42, 0x42))
        ));
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        assert!(matches!(
            Response::decode(&[0x0F, 0x71, 0x23]),
            Err(Error::InvalidLength {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_every_kind_decodes_its_own_encoding() {
        let responses = vec![
            Response::Status(sample_status()),
            Response::SetTime(SetTimeResponse {
                packet_id: 0x0F,
                sub_id: 0x10,
                result: 0,
            }),
            Response::GetTime(sample_time()),
            Response::GetTimer(sample_timers()),
            Response::SetPower(SetPowerResponse {
                packet_id: 0x0F,
                sub_id: 0x71,
                power_status: POWER_OFF,
            }),
        ];
        for response in responses {
            let frame = response.to_frame();
            assert_eq!(frame.len(), response.kind().frame_len());
            assert_eq!(frame[..2], response.kind().prefix());
            assert!(validate(&frame));
            assert_eq!(Response::decode(&frame).unwrap(), response);
        }
    }

    #[test]
    fn test_response_table_is_complete_and_unique() {
        let prefixes: HashSet<[u8; 2]> = ResponseKind::ALL.iter().map(|k| k.prefix()).collect();
        assert_eq!(prefixes.len(), ResponseKind::ALL.len());
        for kind in ResponseKind::ALL {
            assert_eq!(ResponseKind::from_prefix(kind.prefix()).unwrap(), kind);
        }
        assert_eq!(GetTimerResponse::LENGTH, 88);
    }

    #[test]
    fn test_time_and_timer_helpers() {
        let time = sample_time().to_datetime().unwrap();
        assert_eq!(time.to_string(), "2024-03-17 21:05:42");

        let timers = sample_timers();
        assert!(timers.timers[0].is_active());
        assert_eq!(
            timers.timers[0].execution_time().unwrap().to_string(),
            "2024-12-24 18:30:00"
        );
        assert_eq!(timers.timers[0].rgbww().green, 10);
        assert!(!timers.timers[3].is_active());
        assert!(timers.timers[3].execution_time().is_none());
    }
}
