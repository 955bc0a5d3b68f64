//! `encode` / `decode` subcommands: offline wire-frame tools.

use super::{DecodeOutput, EncodeOutput, Frame, Result, codec, print_json, show_frame};

pub(super) fn cmd_encode(frame: &Frame, json: bool) -> Result<()> {
    let command = frame.to_command()?;
    let encoded = codec::encode(&command);
    if json {
        return print_json(&EncodeOutput {
            command,
            frame: encoded,
        });
    }
    println!("{}", show_frame(&encoded));
    Ok(())
}

pub(super) fn cmd_decode(frame: &str, json: bool) -> Result<()> {
    let event = codec::decode(frame.as_bytes())?;
    let brightness_percent = event.brightness_percent();
    if json {
        return print_json(&DecodeOutput {
            frame: show_frame(frame).to_string(),
            event,
            brightness_percent,
        });
    }
    match brightness_percent {
        Some(p) => println!("{event:?} ({p}%)"),
        None => println!("{event:?}"),
    }
    Ok(())
}
