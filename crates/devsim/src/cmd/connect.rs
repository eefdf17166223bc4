use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use devsim_frame::{resource, Message};
use devsim_session::{DeviceDescriptor, Poll, Session, SessionConfig};
use devsim_transport::Endpoint;
use tracing::info;

use crate::cmd::{parse_duration, ConnectArgs, DeviceProfile};
use crate::exit::{
    io_error, session_error, transport_error, CliError, CliResult, DATA_INVALID, INTERNAL,
    LINK_DOWN, SUCCESS,
};
use crate::output::{print_message, OutputFormat};

const IDLE_BACKOFF: Duration = Duration::from_millis(10);

pub fn run(args: ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = Endpoint::new(args.family, &args.address, Some(args.port))
        .map_err(|err| transport_error("invalid endpoint", err))?;
    let device = match &args.device {
        Some(path) => load_device(path)?,
        None => builtin_device(args.profile),
    };

    let mut config = SessionConfig::new(endpoint)
        .with_device(device)
        .with_rpc_timeout(parse_duration(&args.rpc_timeout)?);
    config.connect_timeout = parse_duration(&args.connect_timeout)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut established =
        Session::connect(&config).map_err(|err| session_error("connect failed", err))?;

    let printed = Arc::new(AtomicUsize::new(0));
    let consumer = established.consumer_mut();
    for name in [resource::CONTROL, resource::DEVICE] {
        let printed = Arc::clone(&printed);
        consumer.handle(name, move |msg: &Message| {
            print_message(msg, format);
            printed.fetch_add(1, Ordering::SeqCst);
        });
    }
    let fallback_printed = Arc::clone(&printed);
    consumer.on_uncorrelated_response(move |msg| {
        print_message(msg, format);
        fallback_printed.fetch_add(1, Ordering::SeqCst);
    });

    let mut session = established
        .start()
        .map_err(|err| session_error("session start failed", err))?;
    info!(endpoint = %config.endpoint, device = %config.device.unique_id, "simulator connected");

    let outcome = loop {
        if !running.load(Ordering::SeqCst) {
            info!("interrupted, disconnecting");
            break Ok(SUCCESS);
        }

        match session.poll_once() {
            Poll::LinkDown => {
                break Err(CliError::new(LINK_DOWN, "gateway closed the connection"));
            }
            Poll::Dispatched => {
                if let Some(count) = args.count {
                    if printed.load(Ordering::SeqCst) >= count {
                        break Ok(SUCCESS);
                    }
                }
            }
            Poll::Idle => thread::sleep(IDLE_BACKOFF),
        }
    };

    session
        .disconnect()
        .map_err(|err| session_error("disconnect failed", err))?;
    outcome
}

fn builtin_device(profile: DeviceProfile) -> DeviceDescriptor {
    match profile {
        DeviceProfile::Lighting => DeviceDescriptor::default(),
        DeviceProfile::Heater => {
            DeviceDescriptor::heater("devsim", "devsim-heater-0001", "1.0", "1.0")
        }
    }
}

fn load_device(path: &Path) -> CliResult<DeviceDescriptor> {
    let raw = std::fs::read(path)
        .map_err(|err| io_error(&format!("failed to read {}", path.display()), err))?;
    serde_json::from_slice(&raw).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("invalid device descriptor {}: {err}", path.display()),
        )
    })
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heater_profile_has_power_operations() {
        let device = builtin_device(DeviceProfile::Heater);
        assert_eq!(device.device_type, "heater");
        assert_eq!(device.operations, vec!["power_on", "power_off"]);
    }

    #[test]
    fn missing_device_file_is_reported() {
        let err = load_device(Path::new("/nonexistent/devsim/device.json")).unwrap_err();
        assert!(err.message.contains("failed to read"));
    }

    #[test]
    fn malformed_device_file_is_data_invalid() {
        let path = std::env::temp_dir().join(format!("devsim-bad-device-{}.json", std::process::id()));
        std::fs::write(&path, b"{\"vender\": 1}").unwrap();
        let err = load_device(&path).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
        let _ = std::fs::remove_file(&path);
    }
}
