//! Reports per-chip TDC interval statistics from a raw TPX3 capture.
//!
//! Run with: cargo run --bin analyze-periods -- <capture_file>

use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::io::Read;

const CHUNK_HEADER_MAGIC: u32 = 0x3358_5054;
const HIT_NIBBLE: u8 = 0xB;
const TDC_NIBBLE: u8 = 0x6;

fn bits(d: u64, hi: u32, lo: u32) -> u64 {
    let width = hi - lo + 1;
    let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
    (d >> lo) & mask
}

fn nibble(d: u64, n: u8) -> bool {
    (bits(d, 63, 60) as u8) == n
}

fn tdc_clock(d: u64) -> Option<u64> {
    let coarse_35b = bits(d, 43, 9);
    let fract = bits(d, 8, 5);
    if !(1..=12).contains(&fract) {
        return None;
    }
    Some((coarse_35b << 1) | ((fract - 1) / 6))
}

#[derive(Default)]
struct ChipStats {
    hit_count: u64,
    tdc_count: u64,
    last_tdc: Option<u64>,
    intervals: Vec<i64>,
}

impl ChipStats {
    fn record_tdc(&mut self, tdc: u64) {
        self.tdc_count += 1;
        if let Some(last) = self.last_tdc {
            self.intervals.push(tdc as i64 - last as i64);
        }
        self.last_tdc = Some(tdc);
    }

    fn print_summary(&self, chip: u8) {
        println!("=== chip {chip} ===");
        println!("hits: {}", self.hit_count);
        println!("TDCs: {}", self.tdc_count);
        if self.intervals.is_empty() {
            println!("(fewer than 2 TDCs; no interval statistics)");
            return;
        }
        let n = self.intervals.len() as f64;
        let mean = self.intervals.iter().sum::<i64>() as f64 / n;
        let variance = self
            .intervals
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        let min = *self.intervals.iter().min().unwrap();
        let max = *self.intervals.iter().max().unwrap();
        println!(
            "TDC interval (ticks): mean={mean:.1} stddev={:.1} min={min} max={max}",
            variance.sqrt()
        );
    }
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <capture_file>", args[0]);
        std::process::exit(1);
    }

    let mut file = File::open(&args[1])?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    println!("file size: {} bytes ({} words)", data.len(), data.len() / 8);

    let mut chips: HashMap<u8, ChipStats> = HashMap::new();
    let mut offset = 0usize;
    let mut current_chip: Option<(u8, usize)> = None;

    while offset + 8 <= data.len() {
        let raw = u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap());

        if let Some((chip, body_end)) = current_chip {
            if offset < body_end {
                let stats = chips.entry(chip).or_default();
                if nibble(raw, HIT_NIBBLE) {
                    stats.hit_count += 1;
                } else if nibble(raw, TDC_NIBBLE) {
                    if let Some(tdc) = tdc_clock(raw) {
                        stats.record_tdc(tdc);
                    } else {
                        eprintln!("chip {chip}: invalid TDC fract field at word offset {offset}");
                    }
                }
                offset += 8;
                continue;
            }
            current_chip = None;
        }

        if (raw as u32 & 0xFFFF_FFFF) == CHUNK_HEADER_MAGIC {
            let chip = ((raw >> 32) & 0xFF) as u8;
            let chunk_size = ((raw >> 48) & 0xFFFF) as usize;
            chips.entry(chip).or_default();
            offset += 8;
            current_chip = Some((chip, offset + chunk_size));
        } else {
            offset += 8;
        }
    }

    let mut chip_ids: Vec<u8> = chips.keys().copied().collect();
    chip_ids.sort_unstable();
    for chip in chip_ids {
        chips[&chip].print_summary(chip);
        println!();
    }

    Ok(())
}
