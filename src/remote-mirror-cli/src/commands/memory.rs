//! Memory command handlers
//!
//! Handlers for querying a target through any [`MemoryReader`].

use anyhow::{bail, Context, Result};
use remote_mirror::{MemoryImage, MemoryReader, RemoteAddress};

/// Parse a hex or decimal address string
pub fn parse_address(address: &str) -> Result<RemoteAddress> {
    let raw = if let Some(hex) = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).context("Invalid hex address")?
    } else {
        address.parse::<u64>().context("Invalid address")?
    };
    Ok(RemoteAddress::new(raw))
}

/// Format bytes as a hex dump, 16 per row with an ASCII gutter
pub fn hex_dump(address: RemoteAddress, data: &[u8]) -> String {
    let mut out = String::new();
    for (i, chunk) in data.chunks(16).enumerate() {
        let row = address.address_data().wrapping_add(i as u64 * 16);
        out.push_str(&format!("{:08x}  ", row));
        for j in 0..16 {
            match chunk.get(j) {
                Some(byte) => out.push_str(&format!("{:02x} ", byte)),
                None => out.push_str("   "),
            }
            if j == 7 {
                out.push(' ');
            }
        }
        out.push_str(" |");
        for &byte in chunk {
            let c = byte as char;
            out.push(if c.is_ascii_graphic() || c == ' ' { c } else { '.' });
        }
        out.push_str("|\n");
    }
    out
}

/// Handle the Info command
pub fn handle_info(reader: &dyn MemoryReader, image: &MemoryImage) -> Result<()> {
    println!("Pointer size: {} bytes", reader.pointer_size());
    println!("Size type:    {} bytes", reader.size_size());
    println!("Symbols:      {}", image.symbol_count());
    println!("Segments:     {}", image.segments().len());

    for segment in image.segments() {
        println!(
            "  {:#014x}-{:#014x}  {:>10} bytes  {}",
            segment.base(),
            segment.end(),
            segment.len(),
            if segment.is_mapped() { "mapped" } else { "inline" }
        );
    }

    Ok(())
}

/// Handle the Symbol command
pub fn handle_symbol(reader: &dyn MemoryReader, name: &str) -> Result<()> {
    let address = reader.symbol_address(name);
    if !address.is_valid() {
        bail!("Symbol not found: {}", name);
    }

    println!("{} = {}", name, address);
    Ok(())
}

/// Handle the Read command
///
/// Reads bytes from the target and displays them as a hex dump.
pub fn handle_read(reader: &dyn MemoryReader, address: &str, size: u64, raw: bool) -> Result<()> {
    let addr = parse_address(address)?;
    let Some(bytes) = reader.read_bytes(addr, size) else {
        bail!("Failed to read {} bytes at {}", size, addr);
    };

    if raw {
        println!("{}", hex::encode(bytes.as_slice()));
    } else {
        println!("Reading {} bytes at {}:", size, addr);
        print!("{}", hex_dump(addr, bytes.as_slice()));
    }

    bytes.release();
    Ok(())
}

/// Handle the String command
pub fn handle_string(reader: &dyn MemoryReader, address: &str) -> Result<()> {
    let addr = parse_address(address)?;
    let Some(bytes) = reader.read_string(addr) else {
        bail!("No readable string at {}", addr);
    };

    println!("{:?} ({} bytes)", String::from_utf8_lossy(&bytes), bytes.len());
    Ok(())
}

/// Handle the Pointer command
pub fn handle_pointer(reader: &dyn MemoryReader, address: &str) -> Result<()> {
    let addr = parse_address(address)?;
    let Some(target) = reader.read_pointer(addr) else {
        bail!(
            "Failed to read {}-byte pointer at {}",
            reader.pointer_size(),
            addr
        );
    };

    println!("{} -> {}", addr, target);
    Ok(())
}
