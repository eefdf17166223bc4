use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("devsim {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: devsim");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("DEVSIM_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "frame: magic=DS header={}B max_payload={}B",
        devsim_frame::HEADER_SIZE,
        devsim_frame::DEFAULT_MAX_PAYLOAD
    );
    println!(
        "defaults: port={} connect_timeout={}s rpc_timeout={}s",
        devsim_transport::DEFAULT_GATEWAY_PORT,
        devsim_transport::DEFAULT_CONNECT_TIMEOUT.as_secs(),
        devsim_session::DEFAULT_RPC_TIMEOUT.as_secs()
    );

    Ok(SUCCESS)
}
