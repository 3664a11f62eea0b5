use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sp_formats::load_midi;

/// Format 1 file with `tracks` tracks of `notes` notes each, using
/// running status throughout.
fn build_smf(tracks: u16, notes: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(b"MThd");
    out.extend(&6u32.to_be_bytes());
    out.extend(&1u16.to_be_bytes());
    out.extend(&tracks.to_be_bytes());
    out.extend(&480u16.to_be_bytes());

    for t in 0..tracks {
        let mut body = vec![0x00, 0x90 | (t as u8 & 0x0F), 60, 100];
        for i in 0..notes {
            let note = 36 + (i % 48) as u8;
            body.extend(&[0x60, note, 0]);
            body.extend(&[0x60, note, 100]);
        }
        body.extend(&[0x00, 0xFF, 0x2F, 0x00]);
        out.extend(b"MTrk");
        out.extend(&(body.len() as u32).to_be_bytes());
        out.extend(body);
    }
    out
}

fn bench_decode(c: &mut Criterion) {
    let small = build_smf(1, 500);
    let large = build_smf(16, 5000);

    c.bench_function("decode 1 track x 500 notes", |b| {
        b.iter(|| load_midi(black_box(&small)))
    });

    c.bench_function("decode 16 tracks x 5000 notes", |b| {
        b.iter(|| load_midi(black_box(&large)))
    });
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
