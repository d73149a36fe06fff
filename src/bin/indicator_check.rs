//! indicator_check - interactive wiring check for the two indicator outputs.
//!
//! Lights "attention", then "clear", waiting for the operator to confirm each,
//! and releases the pins at the end (also on Ctrl-D or an error).

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use personwatch::{open_driver, IndicatorBackend};

#[derive(Parser, Debug)]
#[command(author, version, about = "Check the wiring of the indicator outputs")]
struct Args {
    /// Indicator backend: 'sysfs' or 'dry-run'.
    #[arg(long, env = "PERSONWATCH_INDICATORS", default_value = "sysfs")]
    backend: String,

    /// Channel of the "person in view" output.
    #[arg(long, env = "PERSONWATCH_ATTENTION_PIN", default_value_t = 8)]
    attention_pin: u32,

    /// Channel of the "no person" output.
    #[arg(long, env = "PERSONWATCH_CLEAR_PIN", default_value_t = 10)]
    clear_pin: u32,

    /// sysfs GPIO root.
    #[arg(long, default_value = "/sys/class/gpio")]
    gpio_root: PathBuf,

    /// Pause between the two checks, in seconds.
    #[arg(long, default_value_t = 2)]
    pause_secs: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.attention_pin == args.clear_pin {
        return Err(anyhow!("attention and clear must use different pins"));
    }
    let backend: IndicatorBackend = args.backend.parse()?;

    println!("Indicator wiring check");
    println!("Expected wiring:");
    println!("  output      pin");
    println!("  attention   {:>3}", args.attention_pin);
    println!("  clear       {:>3}", args.clear_pin);
    println!();

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    if !ask_yes_no(&mut input, "Are both outputs wired as above?")? {
        println!("Fix the wiring and run the check again.");
        return Ok(());
    }

    // Dropping the driver switches everything off and releases the pins,
    // whichever way this function returns.
    let mut driver = open_driver(backend, args.attention_pin, args.clear_pin, &args.gpio_root)
        .context("open indicator outputs")?;

    println!("Turning on attention (pin {})", args.attention_pin);
    driver.set_attention()?;
    wait_for_enter(&mut input, "Check the attention output and press Enter...")?;

    println!(
        "Turning all off, waiting {} s, then turning on clear (pin {})",
        args.pause_secs, args.clear_pin
    );
    driver.set_idle()?;
    std::thread::sleep(Duration::from_secs(args.pause_secs));
    driver.set_clear()?;
    wait_for_enter(&mut input, "Check the clear output and press Enter...")?;

    driver.shutdown()?;
    println!("All outputs off, pins released. Done.");
    Ok(())
}

fn ask_yes_no(input: &mut impl BufRead, question: &str) -> Result<bool> {
    loop {
        let reply = prompt(input, &format!("{} (y/n): ", question))?;
        match reply.trim().to_ascii_lowercase().chars().next() {
            Some('y') => return Ok(true),
            Some('n') => return Ok(false),
            _ => continue,
        }
    }
}

fn wait_for_enter(input: &mut impl BufRead, message: &str) -> Result<()> {
    prompt(input, message).map(|_| ())
}

fn prompt(input: &mut impl BufRead, message: &str) -> Result<String> {
    print!("{}", message);
    std::io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(anyhow!("input closed"));
    }
    Ok(line)
}
