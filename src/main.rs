use std::path::Path;

use colorprobe_linux::{
    DdcDevice, DummySensor, HueySensor, OutputType, SensorDevice,
};

fn print_usage() {
    println!("colorprobe - HUEY colorimeter and DDC/CI monitor control\n");
    println!("USAGE:");
    println!("    sudo colorprobe [OPTIONS]\n");
    println!("SENSOR OPTIONS (GretagMacbeth HUEY, USB 0971:2005):");
    println!("    --status                    Read the device status string and");
    println!("                                calibration data");
    println!("    --ambient <VALUE>           Measure ambient light in lux");
    println!("                                Values: lcd, crt\n");
    println!("    --sample <VALUE>            Measure a tri-stimulus XYZ sample");
    println!("                                Values: lcd, crt\n");
    println!("    --leds <MASK>               Light the four status LEDs");
    println!("                                Mask bits 0-3, e.g. 0x0f for all on\n");
    println!("    --dummy                     Use a virtual sensor instead of real");
    println!("                                hardware (for scripting tests)\n");
    println!("MONITOR OPTIONS (DDC/CI over /dev/i2c-N):");
    println!("    --bus <PATH>                I2C character device of the monitor;");
    println!("                                required for all monitor options\n");
    println!("    --caps                      Fetch and print the capability string");
    println!("    --get <ID>                  Read a VCP control (hex ID, e.g. 10)");
    println!("    --set <ID> <VALUE>          Write a VCP control");
    println!("    --reset <ID>                Reset a VCP control to its default");
    println!("    --save                      Persist current settings in the monitor");
    println!("    --edid                      Print the monitor's EDID identity\n");
    println!("    --help, -h                  Show this help message\n");
    println!("EXAMPLES:");
    println!("    sudo colorprobe --status");
    println!("    sudo colorprobe --ambient lcd");
    println!("    sudo colorprobe --sample crt --leds 0x0f");
    println!("    sudo colorprobe --bus /dev/i2c-3 --caps");
    println!("    sudo colorprobe --bus /dev/i2c-3 --get 10");
    println!("    sudo colorprobe --bus /dev/i2c-3 --set 10 75 --save");
}

/// VCP IDs are conventionally written in hex, with or without the 0x.
fn parse_vcp_id(value: &str) -> Option<u8> {
    let digits = value.trim_start_matches("0x");
    u8::from_str_radix(digits, 16).ok()
}

fn parse_mask(value: &str) -> Option<u8> {
    if let Some(digits) = value.strip_prefix("0x") {
        u8::from_str_radix(digits, 16).ok()
    } else {
        value.parse().ok()
    }
}

fn run_monitor(args: &[String], bus_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    // Check flag shape before touching the bus so argument mistakes
    // surface without a monitor attached
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bus" | "--get" | "--reset" => {
                value_at(args, i + 1, &args[i])?;
                i += 2;
            }
            "--set" => {
                value_at(args, i + 1, "--set")?;
                value_at(args, i + 2, "--set")?;
                i += 3;
            }
            "--caps" | "--save" | "--edid" => i += 1,
            arg => {
                eprintln!("Error: Unknown monitor option '{}'", arg);
                print_usage();
                return Err("Invalid argument".into());
            }
        }
    }

    let mut monitor = DdcDevice::open(Path::new(bus_path))?;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bus" => {
                i += 2;
            }
            "--caps" => {
                let caps = monitor.capabilities_string()?;
                println!("Capability string:\n    {caps}");
                for control in monitor.get_controls()? {
                    if control.allowed.is_empty() {
                        println!("    VCP 0x{:02x}: continuous", control.id);
                    } else {
                        let values: Vec<String> =
                            control.allowed.iter().map(u16::to_string).collect();
                        println!("    VCP 0x{:02x}: one of {}", control.id, values.join(" "));
                    }
                }
                i += 1;
            }
            "--get" => {
                let id = parse_vcp_id(value_at(args, i + 1, "--get")?)
                    .ok_or("Invalid VCP ID, expected hex like 10 or 0x10")?;
                let value = monitor.vcp_request(id)?;
                println!("VCP 0x{id:02x}: {} (max {})", value.current, value.maximum);
                i += 2;
            }
            "--set" => {
                let id = parse_vcp_id(value_at(args, i + 1, "--set")?)
                    .ok_or("Invalid VCP ID, expected hex like 10 or 0x10")?;
                let value: u16 = value_at(args, i + 2, "--set")?.parse()?;
                println!("Setting VCP 0x{id:02x} to {value}");
                monitor.vcp_set(id, value)?;
                i += 3;
            }
            "--reset" => {
                let id = parse_vcp_id(value_at(args, i + 1, "--reset")?)
                    .ok_or("Invalid VCP ID, expected hex like 10 or 0x10")?;
                println!("Resetting VCP 0x{id:02x} to factory default");
                monitor.vcp_reset(id)?;
                i += 2;
            }
            "--save" => {
                monitor.save_current_settings()?;
                println!("Settings saved");
                i += 1;
            }
            "--edid" => {
                // startup() always leaves the identity populated
                if let Some(info) = monitor.edid_info() {
                    println!("Vendor:  {}", info.pnp_id);
                    println!("Product: 0x{:04x}", info.product_code);
                    println!("Serial:  0x{:08x}", info.serial);
                    println!("Made:    week {} of {}", info.week, info.year);
                }
                i += 1;
            }
            arg => {
                eprintln!("Error: Unknown monitor option '{}'", arg);
                print_usage();
                return Err("Invalid argument".into());
            }
        }
    }

    Ok(())
}

fn run_sensor(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let use_dummy = args.iter().any(|a| a == "--dummy");

    if args.iter().any(|a| a == "--status") {
        if use_dummy {
            eprintln!("Error: --status needs real HUEY hardware");
            return Err("Invalid argument".into());
        }
        let mut huey = HueySensor::open()?;
        huey.startup()?;
        println!("Status:      {}", huey.get_status()?);
        println!("Unlock code: {}", huey.unlock_string());
        println!("LCD calibration:\n{}", huey.calibration_lcd());
        println!("CRT calibration:\n{}", huey.calibration_crt());
        return Ok(());
    }

    let mut sensor: Box<dyn SensorDevice> = if use_dummy {
        Box::new(DummySensor::new())
    } else {
        Box::new(HueySensor::open()?)
    };
    sensor.startup()?;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--dummy" => {
                i += 1;
            }
            "--ambient" => {
                let value = value_at(args, i + 1, "--ambient")?;
                let output = OutputType::from_str(value)
                    .ok_or_else(|| format!("Invalid output type '{value}', expected lcd or crt"))?;
                sensor.set_output_type(output);
                let lux = sensor.get_ambient()?;
                println!("Ambient: {lux:.1} lux");
                i += 2;
            }
            "--sample" => {
                let value = value_at(args, i + 1, "--sample")?;
                let output = OutputType::from_str(value)
                    .ok_or_else(|| format!("Invalid output type '{value}', expected lcd or crt"))?;
                sensor.set_output_type(output);
                let xyz = sensor.sample()?;
                println!("XYZ: {xyz}");
                i += 2;
            }
            "--leds" => {
                let value = value_at(args, i + 1, "--leds")?;
                let mask =
                    parse_mask(value).ok_or_else(|| format!("Invalid LED mask '{value}'"))?;
                sensor.set_leds(mask)?;
                i += 2;
            }
            arg => {
                eprintln!("Error: Unknown option '{}'", arg);
                print_usage();
                return Err("Invalid argument".into());
            }
        }
    }

    Ok(())
}

fn value_at<'a>(
    args: &'a [String],
    i: usize,
    flag: &str,
) -> Result<&'a str, Box<dyn std::error::Error>> {
    match args.get(i) {
        Some(value) => Ok(value),
        None => {
            eprintln!("Error: {flag} requires a value");
            Err("Missing argument value".into())
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args.contains(&"--help".to_string()) || args.contains(&"-h".to_string()) {
        print_usage();
        return Ok(());
    }

    if let Some(pos) = args.iter().position(|a| a == "--bus") {
        match args.get(pos + 1) {
            Some(path) => return run_monitor(&args, path),
            None => {
                eprintln!("Error: --bus requires a device path");
                return Err("Missing argument value".into());
            }
        }
    }

    run_sensor(&args)
}
