//! Interactive read/write terminal over an open engine.
//!
//! Commands mirror the wire protocol one to one: `w` issues a single write
//! frame, `r` a single read frame. Useful for poking at a board by hand
//! before committing to a long sweep.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use mram_core::{parse_address, parse_word, MemoryTestEngine, Response};

const HELP: &str = "\
Commands:
  w <addr> <data>   write data to address, both hex (e.g. w 0x100 0xAA55)
  r <addr>          read the word at address
  help              show this message
  quit              leave the shell

Addresses are 0x00000..0x3FFFF, data 0x0000..0xFFFF.";

enum Outcome {
    Continue,
    Quit,
}

/// Runs the prompt loop until `quit`, end of input, or cancellation.
pub fn run(engine: &mut MemoryTestEngine<'_>) -> Result<()> {
    println!("MRAM shell; type 'help' for commands.");
    let stdin = io::stdin();
    loop {
        print!("mram> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match execute(engine, line.trim()) {
            Ok(Outcome::Continue) => {}
            Ok(Outcome::Quit) => break,
            Err(err) => eprintln!("error: {err:#}"),
        }
        if engine.is_cancelled() {
            break;
        }
    }
    Ok(())
}

fn execute(engine: &mut MemoryTestEngine<'_>, line: &str) -> Result<Outcome> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        None => Ok(Outcome::Continue),
        Some("help" | "h" | "?") => {
            println!("{HELP}");
            Ok(Outcome::Continue)
        }
        Some("quit" | "q" | "exit") => Ok(Outcome::Quit),
        Some("w") => {
            let address = parse_address(parts.next().context("usage: w <addr> <data>")?)?;
            let word = parse_word(parts.next().context("usage: w <addr> <data>")?)?;
            engine.write_word(address, word)?;
            println!("  wrote 0x{word:04X} to {address}");
            Ok(Outcome::Continue)
        }
        Some("r") => {
            let address = parse_address(parts.next().context("usage: r <addr>")?)?;
            match engine.read_word(address)? {
                Response::Value(word) => println!("  {address} -> 0x{word:04X}"),
                Response::Timeout => println!("  {address} -> no response"),
            }
            Ok(Outcome::Continue)
        }
        Some(other) => {
            eprintln!("unknown command {other:?}; type 'help'");
            Ok(Outcome::Continue)
        }
    }
}
