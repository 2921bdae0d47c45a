use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use log::{debug, warn};
use tokio::sync::broadcast;

use crate::control_interface::connection::{Connection, ConnectionState};
use crate::control_interface::registry::{ResponseRegistry, DEFAULT_QUEUE_CAPACITY};
use crate::error::{Error, Result};
use crate::led::color::{checked_channel, CustomColor, Rgbww};
use crate::led::function::{FunctionId, TransitionType};
use crate::packet::request::Request;
use crate::packet::response::{
    GetTimeResponse, GetTimerResponse, Response, ResponseKind, SetPowerResponse,
    SetTimeResponse, StatusResponse,
};
use crate::util::discovery::DeviceDescriptor;

pub mod connection;
pub mod frame_reader;
pub mod registry;

/// Port the controllers listen on.
pub const DEFAULT_PORT: u16 = 5577;

/// Tunables of a [`ControlInterface`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bounds connecting, writing and reading the rest of a started frame.
    pub io_timeout: Duration,
    /// How long a request waits for its response.
    pub response_timeout: Duration,
    /// Attempts per request when the socket fails. Every retry uses a fresh socket.
    pub max_attempts: usize,
    /// Unclaimed responses kept per response kind.
    pub queue_capacity: usize,
    /// Reuse one socket across requests. When `false` every request opens a new one.
    pub keep_connection: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            io_timeout: Duration::from_secs(1),
            response_timeout: Duration::from_millis(500),
            max_attempts: 3,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            keep_connection: true,
        }
    }
}

/// Request/response API of a single controller.
///
/// Several tasks may share one interface. Responses are correlated by kind only, so
/// two concurrent requests expecting the same kind may receive each other's response.
pub struct ControlInterface {
    pub host: String,
    pub port: u16,
    config: ClientConfig,
    registry: Arc<ResponseRegistry>,
    connection: Connection,
}

impl PartialEq for ControlInterface {
    fn eq(&self, other: &ControlInterface) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl ControlInterface {
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_config(host, port, ClientConfig::default())
    }

    pub fn with_config(host: &str, port: u16, config: ClientConfig) -> Self {
        let registry = Arc::new(ResponseRegistry::new(config.queue_capacity));
        let connection = Connection::new(host, port, config.io_timeout, registry.clone());
        ControlInterface {
            host: host.to_string(),
            port,
            config,
            registry,
            connection,
        }
    }

    pub fn from_device_descriptor(device: &DeviceDescriptor) -> Self {
        Self::new(&device.ip_address.to_string(), device.port)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Every response read from the device, including ones nobody waited for.
    pub fn subscribe(&self) -> broadcast::Receiver<Response> {
        self.connection.subscribe()
    }

    pub async fn connect(&self) -> Result<()> {
        self.connection.connect(false).await
    }

    pub async fn reconnect(&self) -> Result<()> {
        debug!("{}:{} Reconnecting...", self.host, self.port);
        self.connection.connect(true).await
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await
    }

    /// Sends a request and, if it has one, waits for its response.
    ///
    /// Socket failures are retried on a fresh socket up to `max_attempts` times.
    /// Timeouts and protocol errors are returned immediately.
    pub async fn request(&self, request: &Request) -> Result<Option<Response>> {
        let expectation = request
            .expected_response()
            .map(|kind| self.registry.expect(kind));
        let frame = request.encode();

        let peer = format!("{}:{}", self.host, self.port);
        retry_on_transport_error(
            &peer,
            self.config.max_attempts,
            !self.config.keep_connection,
            |reconnect| self.send_once(&frame, reconnect),
        )
        .await?;

        match expectation {
            Some(expectation) => expectation
                .wait(self.config.response_timeout)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    async fn send_once(&self, frame: &[u8], reconnect: bool) -> Result<()> {
        self.connection.connect(reconnect).await?;
        self.connection.send(frame).await
    }

    /// Requests the current state of the device.
    pub async fn get_status(&self) -> Result<StatusResponse> {
        debug!("{}:{} Requesting state update", self.host, self.port);
        match self.request(&Request::GetStatus).await? {
            Some(Response::Status(status)) => Ok(status),
            other => Err(unexpected(ResponseKind::Status, other)),
        }
    }

    pub async fn turn_on(&self) -> Result<SetPowerResponse> {
        debug!("{}:{} Turning on", self.host, self.port);
        self.set_power(true).await
    }

    pub async fn turn_off(&self) -> Result<SetPowerResponse> {
        debug!("{}:{} Turning off", self.host, self.port);
        self.set_power(false).await
    }

    async fn set_power(&self, on: bool) -> Result<SetPowerResponse> {
        match self.request(&Request::set_power(on)).await? {
            Some(Response::SetPower(power)) => Ok(power),
            other => Err(unexpected(ResponseKind::SetPower, other)),
        }
    }

    /// Sets all five channels. Every value must be in 0..=255.
    ///
    /// The device does not acknowledge color changes; poll [`Self::get_status`] to confirm.
    pub async fn set_rgbww(
        &self,
        red: i32,
        green: i32,
        blue: i32,
        warm_white: i32,
        cold_white: i32,
    ) -> Result<()> {
        debug!("{}:{} Updating rgbww", self.host, self.port);
        let color = Rgbww::new(red, green, blue, warm_white, cold_white)?;
        self.request(&Request::update_rgbww(color)).await.map(drop)
    }

    /// Sets the color channels only.
    pub async fn set_rgb(&self, red: i32, green: i32, blue: i32) -> Result<()> {
        debug!("{}:{} Updating rgb", self.host, self.port);
        let request = Request::update_rgb(
            checked_channel("red", red)?,
            checked_channel("green", green)?,
            checked_channel("blue", blue)?,
        );
        self.request(&request).await.map(drop)
    }

    /// Sets the white channels only.
    pub async fn set_ww(&self, warm_white: i32, cold_white: i32) -> Result<()> {
        debug!("{}:{} Updating ww", self.host, self.port);
        let request = Request::update_ww(
            checked_channel("warm_white", warm_white)?,
            checked_channel("cold_white", cold_white)?,
        );
        self.request(&request).await.map(drop)
    }

    /// Starts a built-in effect. `speed` ranges from 0 (slow) to 255 (fast).
    pub async fn set_function(&self, function: FunctionId, speed: i32) -> Result<()> {
        debug!("{}:{} Updating function", self.host, self.port);
        let request = Request::set_function(function, speed)?;
        self.request(&request).await.map(drop)
    }

    /// Starts a user defined color sequence of 1 to 16 colors.
    /// `speed` ranges from 0 (slow) to 255 (fast).
    pub async fn set_custom_function(
        &self,
        colors: &[CustomColor],
        speed: i32,
        transition: TransitionType,
    ) -> Result<()> {
        debug!("{}:{} Updating custom function", self.host, self.port);
        let request = Request::set_custom_function(colors, speed, transition)?;
        self.request(&request).await.map(drop)
    }

    pub async fn get_time(&self) -> Result<GetTimeResponse> {
        debug!("{}:{} Retrieving time", self.host, self.port);
        match self.request(&Request::GetTime).await? {
            Some(Response::GetTime(time)) => Ok(time),
            other => Err(unexpected(ResponseKind::GetTime, other)),
        }
    }

    pub async fn set_time(&self, date_time: NaiveDateTime) -> Result<SetTimeResponse> {
        debug!("{}:{} Updating time", self.host, self.port);
        let request = Request::set_time(date_time)?;
        match self.request(&request).await? {
            Some(Response::SetTime(result)) => Ok(result),
            other => Err(unexpected(ResponseKind::SetTime, other)),
        }
    }

    pub async fn get_timers(&self) -> Result<GetTimerResponse> {
        debug!("{}:{} Retrieving timers", self.host, self.port);
        match self.request(&Request::GetTimers).await? {
            Some(Response::GetTimer(timers)) => Ok(timers),
            other => Err(unexpected(ResponseKind::GetTimer, other)),
        }
    }
}

/// Runs `attempt` until it succeeds, fails with a non-transport error, or `max_attempts`
/// are used up. The first attempt gets `reconnect`, every retry is forced onto a fresh socket.
async fn retry_on_transport_error<F, Fut>(
    peer: &str,
    max_attempts: usize,
    reconnect: bool,
    mut attempt: F,
) -> Result<()>
where
    F: FnMut(bool) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let attempts = max_attempts.max(1);
    let mut reconnect = reconnect;
    let mut number = 1;
    loop {
        match attempt(reconnect).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transport() && number < attempts => {
                warn!(
                    "{} Retrying because of error ({}/{}): {}",
                    peer, number, attempts, e
                );
                reconnect = true;
                number += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn unexpected(expected: ResponseKind, actual: Option<Response>) -> Error {
    Error::UnexpectedResponse {
        expected,
        actual: actual.map(|r| r.kind()),
    }
}
