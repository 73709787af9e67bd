//! Decode command - inspect captured bytes offline

use anyhow::{anyhow, Context, Result};
use gazmodem_proto::frame::{function_code, MAX_FRAME_LEN};
use gazmodem_proto::{decode_frame, decode_payload, decode_read_response, Frame, StreamFramer};

use crate::output::{OutputContext, ParameterRow};

/// Decode every frame in `input`, or a bare payload with `payload_only`
pub fn decode(
    input: &str,
    payload_only: bool,
    address: u16,
    index: u16,
    ctx: &OutputContext,
) -> Result<()> {
    let bytes = parse_hex(input)?;

    if payload_only {
        let record = decode_payload(address, index, &bytes).context("Failed to decode payload")?;
        if let Some(warning) = &record.warning {
            ctx.warn(warning);
        }
        ctx.print(&[ParameterRow::from(&record)]);
        return Ok(());
    }

    let mut framer = StreamFramer::with_max_frame_len(MAX_FRAME_LEN);
    let mut frames = framer.feed(&bytes);
    // the capture is complete, nothing more will arrive
    frames.extend(framer.flush_stalled());
    if frames.is_empty() {
        // rerun the strict decoder to report why
        decode_frame(&bytes).context("No valid frame found")?;
        return Err(anyhow!("No valid frame found"));
    }
    let stats = framer.stats();
    if stats.discarded_bytes > 0 {
        ctx.warn(&format!(
            "{} byte(s) outside valid frames ignored",
            stats.discarded_bytes
        ));
    }

    for frame in &frames {
        print_frame(frame, index, ctx);
    }
    Ok(())
}

fn print_frame(frame: &Frame, index: u16, ctx: &OutputContext) {
    let mut pairs = vec![
        ("command", command_name(frame.cmd)),
        ("dest", frame.dest.to_string()),
        ("src", frame.src.to_string()),
        ("length", frame.len().to_string()),
        ("crc", format!("0x{:04X}", frame.crc)),
        ("data", hex::encode(&frame.data)),
    ];
    if let Some(requested) = frame.read_request_index() {
        pairs.push(("index", requested.to_string()));
    }
    ctx.print_kv(&pairs);

    if frame.cmd == function_code::READ_RESP {
        match decode_read_response(index, frame) {
            Ok(record) => {
                if let Some(warning) = &record.warning {
                    ctx.warn(warning);
                }
                ctx.print(&[ParameterRow::from(&record)]);
            }
            Err(e) => ctx.warn(&format!("Payload not decodable: {}", e)),
        }
    }
}

fn command_name(cmd: u8) -> String {
    let name = match cmd {
        function_code::READ_REQ => "READ_REQ",
        function_code::READ_RESP => "READ_RESP",
        function_code::WRITE_REQ => "WRITE_REQ",
        function_code::PING => "PING",
        _ => return format!("0x{:02X}", cmd),
    };
    format!("{} (0x{:02X})", name, cmd)
}

/// Accepts `68 0F 00`, `680f00` or `0x680f00`
fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let compact: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    hex::decode(&compact).with_context(|| format!("Invalid hex input: {}", input))
}
