use criterion::{black_box, Criterion};
use pim_model::Scope;
use pim_protocol::{encode_command_frame, Command, Decoder, FetchTagsCommand, FrameHeader, TagFetchScope};
use std::{env, time::Duration};

/// Round-trips a `FetchTags` frame through encode, decode-header, decode-body.
fn bench_fetch_tags_round_trip(c: &mut Criterion) {
    let cmd = Command::FetchTags(FetchTagsCommand {
        scope: Scope::Uid(vec![1, 2, 3, 4, 5]),
        fetch_scope: TagFetchScope::default(),
    });

    c.bench_function("fetch_tags_round_trip", |b| {
        b.iter(|| {
            let bytes = encode_command_frame(1, &cmd);
            let mut dec = Decoder::new(&bytes);
            let header = FrameHeader::decode(&mut dec).unwrap();
            black_box(Command::decode(header.kind, &mut dec).unwrap())
        });
    });
}

fn main() {
    let mut quick_mode = false;
    for arg in env::args().skip(1) {
        if arg == "--quick" {
            quick_mode = true;
        }
    }

    let mut criterion = Criterion::default();
    if quick_mode {
        criterion = criterion
            .sample_size(10)
            .warm_up_time(Duration::from_millis(100))
            .measurement_time(Duration::from_millis(250));
    }

    bench_fetch_tags_round_trip(&mut criterion);
    criterion.final_summary();
}
