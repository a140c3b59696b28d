//! Writer concurrency safety (spec.md §8 item 8): under several simultaneous
//! writer threads, each appending its own Samples chunks to one shared
//! `XdfWriter`, no chunk on disk may be torn — every frame must parse with a
//! valid tag and its declared `NumSamples` must match what that thread wrote.

mod support;

use std::sync::Arc;
use std::thread;
use xdf_recorder::model::{ChannelFormat, MetadataNode, SampleBatch, SampleValue, StreamDescriptor};
use xdf_recorder::xdf::chunk::TAG_SAMPLES;
use xdf_recorder::xdf::XdfWriter;

const WRITER_COUNT: u32 = 4;
const ITERATIONS: u64 = 10_000;

fn descriptor(uid: &str) -> StreamDescriptor {
    StreamDescriptor {
        uid: uid.into(),
        name: format!("stream-{uid}"),
        r#type: "EEG".into(),
        hostname: "localhost".into(),
        source_id: uid.into(),
        channel_count: 1,
        channel_format: ChannelFormat::Float32,
        nominal_srate: 0.0,
        metadata: MetadataNode::default(),
    }
}

#[test]
fn concurrent_writers_never_tear_a_chunk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("concurrency.xdf");
    let writer = Arc::new(XdfWriter::open(&path).expect("open writer"));

    for stream_id in 1..=WRITER_COUNT {
        writer
            .write_stream_header(stream_id, &descriptor(&stream_id.to_string()))
            .expect("write header");
    }

    thread::scope(|scope| {
        for stream_id in 1..=WRITER_COUNT {
            let writer = Arc::clone(&writer);
            scope.spawn(move || {
                for i in 0..ITERATIONS {
                    let batch = SampleBatch {
                        timestamps: vec![i as f64],
                        values: vec![vec![SampleValue::Float32(stream_id as f32)]],
                    };
                    writer
                        .write_samples(stream_id, &batch)
                        .expect("write samples");
                }
            });
        }
    });

    for stream_id in 1..=WRITER_COUNT {
        writer
            .write_stream_footer(stream_id, 0.0, (ITERATIONS - 1) as f64, ITERATIONS)
            .expect("write footer");
    }
    writer.close().expect("close writer");

    let chunks = support::parse_file(&path);
    let mut per_stream_samples_chunks = [0u64; (WRITER_COUNT + 1) as usize];
    let mut per_stream_total_samples = [0u64; (WRITER_COUNT + 1) as usize];

    for chunk in &chunks {
        if chunk.tag == TAG_SAMPLES {
            let stream_id = support::chunk_stream_id(chunk);
            assert!(
                (1..=WRITER_COUNT).contains(&stream_id),
                "Samples chunk with unexpected stream id {stream_id} (torn chunk?)"
            );
            per_stream_samples_chunks[stream_id as usize] += 1;
            per_stream_total_samples[stream_id as usize] += support::samples_chunk_count(chunk);
        }
    }

    for stream_id in 1..=WRITER_COUNT {
        assert_eq!(
            per_stream_samples_chunks[stream_id as usize], ITERATIONS,
            "stream {stream_id} should have exactly one Samples chunk per write_samples call"
        );
        assert_eq!(
            per_stream_total_samples[stream_id as usize], ITERATIONS,
            "stream {stream_id} lost or gained samples across concurrent writes"
        );
    }
}
