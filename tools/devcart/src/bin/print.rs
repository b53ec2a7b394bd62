//! devcart-print
//!
//! Plays the cartridge side of a listener session over TCP: waits for
//! `devcart --tcp ... serve` to connect, sends PRINT frames and then QUIT.

use std::io::Write;
use std::net::TcpListener;

use anyhow::{Context, Result};
use cartproto::{print_frame, quit_frame};
use clap::Parser;

const DEFAULT_BIND: &str = "127.0.0.1:6000";

#[derive(Parser, Debug)]
#[command(name = "devcart-print")]
#[command(about = "Send console messages to a devcart listener", long_about = None)]
#[command(version)]
struct Args {
    /// Address to wait on for the listener (host:port)
    #[arg(short, long, default_value = DEFAULT_BIND)]
    bind: String,

    /// Do not append a newline to each message
    #[arg(long)]
    raw: bool,

    /// Leave the session open instead of sending QUIT
    #[arg(long)]
    keep_open: bool,

    /// Messages, one PRINT command each
    #[arg(required = true)]
    messages: Vec<String>,
}

fn frames(args: &Args) -> Vec<u8> {
    let mut stream = Vec::new();
    for message in &args.messages {
        let mut text = message.clone().into_bytes();
        if !args.raw {
            text.push(b'\n');
        }
        stream.extend(print_frame(&text));
    }
    if !args.keep_open {
        stream.extend(quit_frame());
    }
    stream
}

fn main() -> Result<()> {
    let args = Args::parse();

    let server =
        TcpListener::bind(&args.bind).with_context(|| format!("binding {}", args.bind))?;
    println!("waiting for a listener on tcp://{}", args.bind);

    let (mut stream, peer) = server.accept().context("accepting listener")?;
    stream.set_nodelay(true).ok();
    println!("listener connected from {peer}");

    stream
        .write_all(&frames(&args))
        .and_then(|()| stream.flush())
        .context("sending frames")?;

    println!("sent {} message(s)", args.messages.len());
    Ok(())
}
