use anyhow::Result;

use super::hex::{hexdump, parse_hex_address};
use super::{Session, print_events};

pub fn run(session: &Session, address: &str, len: usize) -> Result<()> {
    let address = parse_hex_address(address)?;
    let mut engine = session.engine()?;

    let attached = engine.attach();
    print_events(&mut engine);
    attached?;

    let bytes = engine.read_bytes(address, len);
    print_events(&mut engine);

    println!("Memory at 0x{:X} ({} bytes):", address, len);
    for line in hexdump(address, &bytes?) {
        println!("{}", line);
    }
    Ok(())
}
