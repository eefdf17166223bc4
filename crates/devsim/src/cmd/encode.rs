use std::io::Write;

use devsim_frame::{FrameWriter, Message, MessageKind};
use devsim_session::{CONTENT_TYPE_HEADER, CONTENT_TYPE_JSON};

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};

pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let message = build_message(&args)?;

    let stdout = std::io::stdout();
    let mut writer = FrameWriter::new(stdout.lock());
    writer
        .write_message(&message)
        .map_err(|err| frame_error("encode failed", err))?;
    writer
        .into_inner()
        .flush()
        .map_err(|err| io_error("flush failed", err))?;

    Ok(SUCCESS)
}

fn build_message(args: &EncodeArgs) -> CliResult<Message> {
    let kind = if args.response {
        MessageKind::Response
    } else {
        MessageKind::Request
    };
    let mut message = Message::new(kind, args.resource.clone(), resolve_body(args)?);
    if args.json.is_some() {
        message = message.with_header(CONTENT_TYPE_HEADER, CONTENT_TYPE_JSON);
    }
    for raw in &args.headers {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| CliError::new(USAGE, format!("header must be KEY=VALUE: {raw}")))?;
        message = message.with_header(key.trim(), value.trim());
    }
    Ok(message)
}

fn resolve_body(args: &EncodeArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|err| CliError::new(DATA_INVALID, format!("invalid --json payload: {err}")))?;
        return serde_json::to_vec(&value)
            .map_err(|err| CliError::new(DATA_INVALID, format!("json encode failed: {err}")));
    }

    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }

    if let Some(path) = &args.file {
        return std::fs::read(path).map_err(|err| io_error("failed to read payload file", err));
    }

    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use devsim_frame::decode_message;

    use super::*;

    fn args() -> EncodeArgs {
        EncodeArgs {
            resource: "device".to_string(),
            response: false,
            headers: Vec::new(),
            json: None,
            data: None,
            file: None,
        }
    }

    #[test]
    fn json_body_is_compacted_and_tagged() {
        let mut a = args();
        a.json = Some("{ \"method\" : \"add_device\" }".to_string());
        let msg = build_message(&a).unwrap();
        assert_eq!(msg.body.as_ref(), br#"{"method":"add_device"}"#);
        assert_eq!(msg.header(CONTENT_TYPE_HEADER), Some(CONTENT_TYPE_JSON));
    }

    #[test]
    fn headers_and_kind_are_applied() {
        let mut a = args();
        a.response = true;
        a.resource = "control".to_string();
        a.headers = vec!["x-seq = 7".to_string()];
        a.data = Some("ok".to_string());

        let mut buf = BytesMut::from(build_message(&a).unwrap().to_bytes().unwrap().as_ref());
        let decoded = decode_message(&mut buf, usize::MAX).unwrap().unwrap();
        assert!(decoded.is_response());
        assert_eq!(decoded.resource, "control");
        assert_eq!(decoded.header("x-seq"), Some("7"));
        assert_eq!(decoded.body.as_ref(), b"ok");
    }

    #[test]
    fn malformed_header_is_usage_error() {
        let mut a = args();
        a.headers = vec!["novalue".to_string()];
        assert_eq!(build_message(&a).unwrap_err().code, USAGE);
    }

    #[test]
    fn invalid_json_is_data_invalid() {
        let mut a = args();
        a.json = Some("{".to_string());
        assert_eq!(build_message(&a).unwrap_err().code, DATA_INVALID);
    }
}
