use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};

use strip_control_lib::control_interface::{ClientConfig, ControlInterface, DEFAULT_PORT};
use strip_control_lib::led::color::{CliColors, CustomColor, RGB};
use strip_control_lib::led::function::{FunctionId, TransitionType};
use strip_control_lib::util::discovery::{Discovery, DEFAULT_ROUNDS};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    handle_cli(cli).await
}

/// This struct defines the command line interface of the application
#[derive(Parser)]
#[clap(
    name = "strip_control",
    about = "Controls networked RGB/RGBWW LED strip controllers",
    version = "0.1.0"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormat {
    /// Plain text format.
    Plaintext,
    /// JSON format.
    Json,
    /// YAML format.
    Yaml,
}

/// Subcommands available for the CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Subcommand for operations that require device communication
    #[clap(name = "device-call")]
    DeviceCall {
        /// Sets the IP address of the controller
        #[clap(long)]
        ip: String,

        /// Sets the TCP port of the controller
        #[clap(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Response timeout in milliseconds
        #[clap(short = 't', long = "timeout", default_value_t = 500)]
        timeout: u64,

        /// Output format (plaintext, json, yaml)
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Plaintext)]
        output: OutputFormat,

        #[clap(subcommand)]
        action: DeviceAction,
    },
    /// Searches the local network for controllers
    #[clap(name = "discover")]
    Discover {
        /// Output format (plaintext, json, yaml)
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Plaintext)]
        output: OutputFormat,

        /// Time without replies after which a round ends, in milliseconds
        #[clap(short = 't', long = "timeout", default_value_t = 1000)]
        timeout: u64,

        /// Number of broadcast rounds
        #[clap(short, long, default_value_t = DEFAULT_ROUNDS)]
        rounds: usize,
    },
}

/// Actions available under the `device-call` subcommand
#[derive(Subcommand)]
pub enum DeviceAction {
    /// Prints the current device state.
    #[clap(name = "status")]
    Status,
    /// Turns the device on.
    #[clap(name = "on")]
    On,
    /// Turns the device off.
    #[clap(name = "off")]
    Off,
    /// Sets the color channels.
    #[clap(name = "set-rgb")]
    SetRgb {
        /// The color to display by name
        #[clap(value_enum)]
        color: Option<CliColors>,

        /// Red component of the color (0-255)
        #[clap(short = 'r', long = "red")]
        red: Option<i32>,

        /// Green component of the color (0-255)
        #[clap(short = 'g', long = "green")]
        green: Option<i32>,

        /// Blue component of the color (0-255)
        #[clap(short = 'b', long = "blue")]
        blue: Option<i32>,
    },
    /// Sets the white channels.
    #[clap(name = "set-ww")]
    SetWw {
        /// Warm white (0-255)
        #[clap(short = 'w', long = "warm-white")]
        warm_white: i32,

        /// Cold white (0-255)
        #[clap(short = 'c', long = "cold-white")]
        cold_white: i32,
    },
    /// Sets all five channels.
    #[clap(name = "set-rgbww")]
    SetRgbww {
        red: i32,
        green: i32,
        blue: i32,
        warm_white: i32,
        cold_white: i32,
    },
    /// Starts a built-in effect.
    #[clap(name = "set-function")]
    SetFunction {
        #[clap(value_enum)]
        function: FunctionId,

        /// Effect speed, 0 (slow) to 255 (fast)
        #[clap(short, long, default_value_t = 128)]
        speed: i32,
    },
    /// Starts a custom color sequence.
    #[clap(name = "set-custom-function")]
    SetCustomFunction {
        /// Up to 16 colors, each given as `r,g,b`
        #[clap(required = true)]
        colors: Vec<CustomColor>,

        /// Effect speed, 0 (slow) to 255 (fast)
        #[clap(short, long, default_value_t = 128)]
        speed: i32,

        #[clap(long, value_enum, default_value_t = TransitionType::Gradual)]
        transition: TransitionType,
    },
    /// Prints the device clock.
    #[clap(name = "get-time")]
    GetTime,
    /// Sets the device clock to the local time of this machine.
    #[clap(name = "sync-time")]
    SyncTime,
    /// Prints the timers stored on the device.
    #[clap(name = "get-timers")]
    GetTimers,
}

fn print_serialized<T: serde::Serialize + std::fmt::Debug>(
    output: OutputFormat,
    value: &T,
) -> Result<()> {
    match output {
        OutputFormat::Plaintext => println!("{:#?}", value),
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

async fn handle_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Discover {
            output,
            timeout,
            rounds,
        } => {
            let devices =
                Discovery::find_devices_with_rounds(Duration::from_millis(timeout), rounds)
                    .await
                    .context("Discovery failed")?;
            match output {
                OutputFormat::Plaintext => {
                    Discovery::pretty_print_devices(&devices);
                }
                OutputFormat::Json => {
                    let json = serde_json::to_string(&devices)?;
                    println!("{}", json);
                }
                OutputFormat::Yaml => {
                    let yaml = serde_yaml::to_string(&devices)?;
                    println!("{}", yaml);
                }
            }
        }
        Commands::DeviceCall {
            ip,
            port,
            timeout,
            output,
            action,
        } => {
            let config = ClientConfig {
                response_timeout: Duration::from_millis(timeout),
                ..ClientConfig::default()
            };
            let control_interface = ControlInterface::with_config(&ip, port, config);
            let result = run_action(&control_interface, action, output).await;
            control_interface.disconnect().await;
            result.with_context(|| format!("Request to {}:{} failed", ip, port))?;
        }
    }

    Ok(())
}

async fn run_action(
    control_interface: &ControlInterface,
    action: DeviceAction,
    output: OutputFormat,
) -> Result<()> {
    match action {
        DeviceAction::Status => {
            let status = control_interface.get_status().await?;
            match output {
                OutputFormat::Plaintext => {
                    let function = FunctionId::from_code(status.mode)
                        .map(|f| f.to_string())
                        .unwrap_or_else(|| format!("0x{:02X}", status.mode));
                    println!("Power: {}", if status.is_on() { "on" } else { "off" });
                    println!("Color: {:?}", status.rgbww());
                    println!("Brightness: {}", status.rgbww().brightness());
                    println!("Mode: {}", function);
                    println!("Speed: {}", status.speed);
                }
                _ => print_serialized(output, &status)?,
            }
        }
        DeviceAction::On => {
            let power = control_interface.turn_on().await?;
            println!("Device is {}", if power.is_on() { "on" } else { "off" });
        }
        DeviceAction::Off => {
            let power = control_interface.turn_off().await?;
            println!("Device is {}", if power.is_on() { "on" } else { "off" });
        }
        DeviceAction::SetRgb {
            color,
            red,
            green,
            blue,
        } => {
            let rgb = match (color, red, green, blue) {
                (Some(color_name), None, None, None) => color_name.into(),
                (None, Some(r), Some(g), Some(b)) => RGB::new(r, g, b)?,
                _ => return Err(anyhow!("Invalid color specification")),
            };
            control_interface
                .set_rgb(rgb.red.into(), rgb.green.into(), rgb.blue.into())
                .await?;
            println!("Color set to {:?}", rgb);
        }
        DeviceAction::SetWw {
            warm_white,
            cold_white,
        } => {
            control_interface.set_ww(warm_white, cold_white).await?;
            println!("White set to ({}, {})", warm_white, cold_white);
        }
        DeviceAction::SetRgbww {
            red,
            green,
            blue,
            warm_white,
            cold_white,
        } => {
            control_interface
                .set_rgbww(red, green, blue, warm_white, cold_white)
                .await?;
            println!(
                "Color set to ({}, {}, {}, {}, {})",
                red, green, blue, warm_white, cold_white
            );
        }
        DeviceAction::SetFunction { function, speed } => {
            control_interface.set_function(function, speed).await?;
            println!("Function {} started with speed {}", function, speed);
        }
        DeviceAction::SetCustomFunction {
            colors,
            speed,
            transition,
        } => {
            control_interface
                .set_custom_function(&colors, speed, transition)
                .await?;
            println!(
                "Custom function with {} colors started ({:?}, speed {})",
                colors.len(),
                transition,
                speed
            );
        }
        DeviceAction::GetTime => {
            let time = control_interface.get_time().await?;
            match (output, time.to_datetime()) {
                (OutputFormat::Plaintext, Some(date_time)) => println!("Device time: {}", date_time),
                (OutputFormat::Plaintext, None) => println!("Device time is invalid: {:?}", time),
                _ => print_serialized(output, &time)?,
            }
        }
        DeviceAction::SyncTime => {
            let now = Local::now().naive_local();
            let result = control_interface.set_time(now).await?;
            if !result.is_success() {
                return Err(anyhow!("Device rejected the time {}", now));
            }
            println!("Device time set to {}", now);
        }
        DeviceAction::GetTimers => {
            let timers = control_interface.get_timers().await?;
            match output {
                OutputFormat::Plaintext => {
                    println!("Timers:");
                    for (index, timer) in timers.timers.iter().enumerate() {
                        let when = timer
                            .execution_time()
                            .map(|t| t.to_string())
                            .unwrap_or_else(|| format!("weekdays 0x{:02X}", timer.dayofweek));
                        println!(
                            "{}: active: {}, time: {}, action: 0x{:02X}, color: {:?}",
                            index + 1,
                            timer.is_active(),
                            when,
                            timer.action_code,
                            timer.rgbww()
                        );
                    }
                }
                _ => print_serialized(output, &timers)?,
            }
        }
    }
    Ok(())
}
