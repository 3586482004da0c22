use std::hint::black_box;

use divan::counter::BytesCount;
use seqjpeg::ScanBuffer;

fn main() {
    divan::main();
}

#[divan::bench]
fn scan(bencher: divan::Bencher) {
    // 1 MiB of pseudo-random scan bytes with stuffing sequences wherever
    // the generator produces 0xFF.
    let mut scan = Vec::with_capacity((1 << 20) + 2);
    let mut state = 0x2545_F491_4F6C_DD1D_u64;
    while scan.len() < 1 << 20 {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let byte = (state >> 56) as u8;
        if byte == 0xFF {
            scan.extend([0xFF, 0x00]);
        } else {
            scan.push(byte);
        }
    }
    scan.extend([0xFF, 0xD9]);

    let mut buf = ScanBuffer::new();
    bencher
        .counter(BytesCount::new(scan.len()))
        .bench_local(|| {
            buf.process(black_box(&scan)).unwrap();
            buf.bytes().last().copied()
        });
}
