//! Minimal gateway for trying the simulator locally.
//!
//! Listens on a Unix socket, acknowledges every correlated request and
//! answers each `add_device` with a `power_on` control request.
//!
//! ```text
//! cargo run -p devsim --features cli --example fake-gateway -- /tmp/gw.sock
//! cargo run -p devsim --features cli -- connect /tmp/gw.sock --family unix --profile heater
//! ```

use std::os::unix::net::UnixListener;
use std::path::PathBuf;

use devsim::frame::{FrameError, FrameReader, FrameWriter, CONTROL};
use devsim::session::{RpcRequest, RpcResponse, ADD_DEVICE, OP_POWER_ON};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("devsim-gateway.sock"));
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)?;
    eprintln!("fake gateway listening on {}", path.display());

    for stream in listener.incoming() {
        let stream = stream?;
        let mut reader = FrameReader::new(stream.try_clone()?);
        let mut writer = FrameWriter::new(stream);
        let mut next_control_id = 1000u64;

        loop {
            let msg = match reader.read_message() {
                Ok(msg) => msg,
                Err(FrameError::ConnectionClosed) => break,
                Err(err) => {
                    eprintln!("read failed: {err}");
                    break;
                }
            };

            let request = match RpcRequest::from_message(&msg) {
                Ok(request) => request,
                Err(err) => {
                    eprintln!("ignoring non-rpc {} on {}: {err}", msg.kind.as_str(), msg.resource);
                    continue;
                }
            };
            eprintln!("{} {} id={:?}", msg.resource, request.method, request.id);

            if let Some(id) = request.id {
                let reply = RpcResponse::success(id, json!({"status": "ok"}));
                writer.write_message(&reply.to_message(&msg.resource)?)?;
            }

            if request.method == ADD_DEVICE {
                next_control_id += 1;
                let control = RpcRequest::new(OP_POWER_ON, json!({}), next_control_id);
                writer.write_message(&control.to_message(CONTROL)?)?;
            }
        }
        eprintln!("simulator disconnected");
    }

    Ok(())
}
