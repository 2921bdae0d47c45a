use std::fmt;

use chrono::NaiveDateTime;
use log::debug;
use serde::Serialize;

use crate::control_interface::{ClientConfig, ControlInterface, DEFAULT_PORT};
use crate::error::Result;
use crate::led::color::{CustomColor, Rgbww};
use crate::led::function::{FunctionId, TransitionType};
use crate::packet::response::{GetTimeResponse, GetTimerResponse, SetTimeResponse, StatusResponse};
use crate::util::discovery::DeviceDescriptor;

/// Last known state of a controller.
///
/// Fields are `None` until a status response or a successful setter filled them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    pub power: Option<bool>,
    pub rgbww: Option<Rgbww>,
    pub device_name: Option<u8>,
    /// Raw mode byte of the last status.
    pub mode: Option<u8>,
    pub function: Option<FunctionId>,
    /// Speed as reported by the device.
    pub speed: Option<u8>,
}

impl DeviceState {
    fn apply_status(&mut self, status: &StatusResponse) {
        self.power = Some(status.is_on());
        self.rgbww = Some(status.rgbww());
        self.device_name = Some(status.device_name);
        self.mode = Some(status.mode);
        self.function = FunctionId::from_code(status.mode);
        self.speed = Some(status.speed);
    }
}

/// A single controller with a cache of its state.
pub struct Controller {
    interface: ControlInterface,
    hardware_id: Option<String>,
    model: Option<String>,
    state: DeviceState,
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Host: {}, Port: {}, Hardware ID: {}, Model: {}",
            self.interface.host,
            self.interface.port,
            self.hardware_id.as_deref().unwrap_or("-"),
            self.model.as_deref().unwrap_or("-"),
        )
    }
}

impl Controller {
    pub fn new(host: &str, port: Option<u16>) -> Self {
        Self::with_config(host, port, ClientConfig::default())
    }

    pub fn with_config(host: &str, port: Option<u16>, config: ClientConfig) -> Self {
        Controller {
            interface: ControlInterface::with_config(host, port.unwrap_or(DEFAULT_PORT), config),
            hardware_id: None,
            model: None,
            state: DeviceState::default(),
        }
    }

    pub fn from_device_descriptor(device: &DeviceDescriptor) -> Self {
        Controller {
            interface: ControlInterface::from_device_descriptor(device),
            hardware_id: Some(device.hardware_id.clone()),
            model: Some(device.model.clone()),
            state: DeviceState::default(),
        }
    }

    pub fn host(&self) -> &str {
        &self.interface.host
    }

    pub fn port(&self) -> u16 {
        self.interface.port
    }

    /// For example `F0FE6B2333C6`. Only known for discovered devices.
    pub fn hardware_id(&self) -> Option<&str> {
        self.hardware_id.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn interface(&self) -> &ControlInterface {
        &self.interface
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn is_on(&self) -> bool {
        self.state.power == Some(true)
    }

    pub fn rgbww(&self) -> Option<Rgbww> {
        self.state.rgbww
    }

    /// Mean of the cached channels, `None` if no color is known yet.
    pub fn brightness(&self) -> Option<u8> {
        self.state.rgbww.map(|color| color.brightness())
    }

    pub async fn connect(&self) -> Result<()> {
        self.interface.connect().await
    }

    pub async fn disconnect(&self) {
        self.interface.disconnect().await
    }

    /// Refreshes the cache from the device.
    pub async fn update_state(&mut self) -> Result<&DeviceState> {
        let status = self.interface.get_status().await?;
        debug!("{} Status: {:?}", self, status);
        self.state.apply_status(&status);
        Ok(&self.state)
    }

    pub async fn turn_on(&mut self) -> Result<()> {
        let power = self.interface.turn_on().await?;
        self.state.power = Some(power.is_on());
        Ok(())
    }

    pub async fn turn_off(&mut self) -> Result<()> {
        let power = self.interface.turn_off().await?;
        self.state.power = Some(power.is_on());
        Ok(())
    }

    pub async fn set_rgbww(
        &mut self,
        red: i32,
        green: i32,
        blue: i32,
        warm_white: i32,
        cold_white: i32,
    ) -> Result<()> {
        let color = Rgbww::new(red, green, blue, warm_white, cold_white)?;
        self.interface
            .set_rgbww(red, green, blue, warm_white, cold_white)
            .await?;
        self.state.rgbww = Some(color);
        self.state.function = None;
        Ok(())
    }

    /// Sets the color channels and keeps the cached white channels.
    pub async fn set_rgb(&mut self, red: i32, green: i32, blue: i32) -> Result<()> {
        let update = Rgbww::new(red, green, blue, 0, 0)?;
        self.interface.set_rgb(red, green, blue).await?;
        let color = self.state.rgbww.get_or_insert_with(Rgbww::default);
        color.red = update.red;
        color.green = update.green;
        color.blue = update.blue;
        self.state.function = None;
        Ok(())
    }

    /// Sets the white channels and keeps the cached color channels.
    pub async fn set_ww(&mut self, warm_white: i32, cold_white: i32) -> Result<()> {
        let update = Rgbww::new(0, 0, 0, warm_white, cold_white)?;
        self.interface.set_ww(warm_white, cold_white).await?;
        let color = self.state.rgbww.get_or_insert_with(Rgbww::default);
        color.warm_white = update.warm_white;
        color.cold_white = update.cold_white;
        self.state.function = None;
        Ok(())
    }

    pub async fn set_function(&mut self, function: FunctionId, speed: i32) -> Result<()> {
        self.interface.set_function(function, speed).await?;
        self.state.function = Some(function);
        self.state.mode = Some(function.code());
        Ok(())
    }

    pub async fn set_custom_function(
        &mut self,
        colors: &[CustomColor],
        speed: i32,
        transition: TransitionType,
    ) -> Result<()> {
        self.interface
            .set_custom_function(colors, speed, transition)
            .await?;
        self.state.function = None;
        Ok(())
    }

    pub async fn get_time(&self) -> Result<GetTimeResponse> {
        self.interface.get_time().await
    }

    pub async fn set_time(&self, date_time: NaiveDateTime) -> Result<SetTimeResponse> {
        self.interface.set_time(date_time).await
    }

    pub async fn get_timers(&self) -> Result<GetTimerResponse> {
        self.interface.get_timers().await
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::control_interface::connection::tests::fake_device;
    use crate::error::Error;
    use crate::packet::response::tests::sample_status;
    use crate::packet::response::{SetPowerResponse, POWER_OFF};
    use crate::util::traits::WireFrame;

    fn config() -> ClientConfig {
        ClientConfig {
            io_timeout: Duration::from_millis(300),
            response_timeout: Duration::from_millis(300),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn test_new_controller_knows_nothing() {
        let controller = Controller::new("10.0.0.5", None);
        assert_eq!(controller.port(), DEFAULT_PORT);
        assert!(!controller.is_on());
        assert_eq!(controller.rgbww(), None);
        assert_eq!(controller.brightness(), None);
        assert_eq!(controller.hardware_id(), None);
    }

    #[test]
    fn test_from_device_descriptor() {
        let device = DeviceDescriptor::new(
            Ipv4Addr::new(10, 0, 0, 5),
            "F0FE6B2333C6".into(),
            "AK001".into(),
        );
        let controller = Controller::from_device_descriptor(&device);
        assert_eq!(controller.host(), "10.0.0.5");
        assert_eq!(controller.port(), DEFAULT_PORT);
        assert_eq!(controller.hardware_id(), Some("F0FE6B2333C6"));
        assert_eq!(controller.model(), Some("AK001"));
        assert!(controller.to_string().contains("F0FE6B2333C6"));
    }

    #[test]
    fn test_state_from_status() {
        let status = sample_status();
        let mut state = DeviceState::default();
        state.apply_status(&status);
        assert_eq!(state.power, Some(status.is_on()));
        assert_eq!(state.rgbww, Some(status.rgbww()));
        assert_eq!(state.speed, Some(status.speed));
        assert_eq!(state.function, FunctionId::from_code(status.mode));
    }

    #[tokio::test]
    async fn test_update_state_and_setters() {
        let (listener, port) = fake_device().await;
        let mut controller = Controller::with_config("127.0.0.1", Some(port), config());

        let device = tokio::spawn(async move {
            let (mut device, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4];
            device.read_exact(&mut request).await.unwrap();
            device.write_all(&sample_status().to_frame()).await.unwrap();

            let mut color = [0u8; 9];
            device.read_exact(&mut color).await.unwrap();

            let mut power = [0u8; 4];
            device.read_exact(&mut power).await.unwrap();
            let reply = SetPowerResponse {
                packet_id: 0x0F,
                sub_id: 0x71,
                power_status: POWER_OFF,
            };
            device.write_all(&reply.to_frame()).await.unwrap();
            color
        });

        controller.update_state().await.unwrap();
        assert_eq!(controller.rgbww(), Some(sample_status().rgbww()));
        assert_eq!(controller.is_on(), sample_status().is_on());

        controller.set_rgbww(10, 20, 30, 40, 50).await.unwrap();
        assert_eq!(controller.brightness(), Some(30));
        assert_eq!(controller.state().function, None);

        controller.turn_off().await.unwrap();
        assert!(!controller.is_on());

        let color = device.await.unwrap();
        assert_eq!(color[..6], [0x31, 10, 20, 30, 40, 50]);
        controller.disconnect().await;
    }

    #[tokio::test]
    async fn test_invalid_color_leaves_cache_untouched() {
        let mut controller = Controller::with_config("127.0.0.1", Some(9), config());
        assert!(matches!(
            controller.set_rgb(1, 2, 300).await,
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(controller.rgbww(), None);
    }
}
