#![no_main]

use libfuzzer_sys::fuzz_target;
use tyrecon_analysis::{AnalysisConfig, FunctionAnalysis};
use tyrecon_core::{BitwiseOp, CompareOp, MemoryMap, Operand, Segment, Trace, TraceBuilder};

/// Decode bytes into a trace over a small register file.
fn build_trace(data: &[u8]) -> Option<Trace> {
    let mut b = TraceBuilder::new();
    let reg = |byte: u8| Operand::storage(format!("R{}", byte % 8));

    // Limit to keep iterations fast
    for chunk in data.chunks_exact(4).take(64) {
        let (op, x, y, z) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        let width = [1u8, 2, 4, 8][(z % 4) as usize];
        match op % 10 {
            0 => {
                b.literal(i64::from(x) - 128, width);
            }
            1 => {
                b.copy(reg(x));
            }
            2 => {
                b.load(reg(x), i64::from(y % 32), width);
            }
            3 => b.store(reg(x), i64::from(y % 32), width, reg(z)),
            4 => {
                b.index(reg(x), reg(y), 0, u32::from(width) * (1 + u32::from(z % 3)), width);
            }
            5 => {
                b.add(reg(x), i64::from(y % 9), width);
            }
            6 => {
                b.sub(reg(x), i64::from(y % 9), width);
            }
            7 => {
                let cmp = if y % 2 == 0 { CompareOp::Ne } else { CompareOp::Lt };
                b.compare(cmp, reg(x), Operand::literal(i64::from(z), width));
            }
            8 => {
                b.bitwise(BitwiseOp::And, reg(x), reg(y), width);
            }
            _ => {
                let args = (0..y % 3).map(|i| reg(z.wrapping_add(i))).collect();
                b.call(reg(x), args, z % 2 == 0);
            }
        }
        if op & 0x80 != 0 {
            b.assign(&format!("R{}", y % 8));
        }
        if op & 0x40 != 0 {
            b.load(Operand::address(u64::from(x) * 4), 0, width);
        }
    }
    b.build().ok()
}

fuzz_target!(|data: &[u8]| {
    // Skip very small inputs
    if data.len() < 4 {
        return;
    }

    let Some(trace) = build_trace(data) else {
        return;
    };

    let Ok(map) = MemoryMap::with_segments(vec![Segment::new("IRAM", 0, 0x80)]) else {
        return;
    };

    // Well-formed traces must always analyze, and twice to the same output
    let mut analysis = FunctionAnalysis::new("fuzz", &map, AnalysisConfig::micro8());
    let first = analysis.run(&trace).expect("analysis of a valid trace failed");
    let second = analysis.run(&trace).expect("analysis of a valid trace failed");
    assert_eq!(first.to_string(), second.to_string());
});
