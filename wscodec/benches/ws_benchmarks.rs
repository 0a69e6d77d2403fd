//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Benchmarks for wscodec performance

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use socknet_wscodec::{WebSocketCodec, WsFrame, WsRole, handshake, mask_bytes};
use tokio_util::codec::{Decoder, Encoder};

fn bench_encode_payload_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_payload_sizes");

    for size in [64usize, 1024, 16 * 1024, 256 * 1024] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("server", size), &size, |b, &size| {
            let mut codec = WebSocketCodec::new(WsRole::Server).with_max_frame_size(1 << 22);
            let payload = vec![0x42u8; size];
            let mut buffer = BytesMut::with_capacity(size + 16);

            b.iter(|| {
                buffer.clear();
                codec
                    .encode(black_box(WsFrame::binary(payload.clone())), &mut buffer)
                    .unwrap();
            });
        });
        group.bench_with_input(BenchmarkId::new("client_masked", size), &size, |b, &size| {
            let mut codec = WebSocketCodec::new(WsRole::Client).with_max_frame_size(1 << 22);
            let payload = vec![0x42u8; size];
            let mut buffer = BytesMut::with_capacity(size + 16);

            b.iter(|| {
                buffer.clear();
                codec
                    .encode(black_box(WsFrame::binary(payload.clone())), &mut buffer)
                    .unwrap();
            });
        });
    }

    group.finish();
}

fn bench_decode_payload_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_payload_sizes");

    for size in [64usize, 1024, 16 * 1024, 256 * 1024] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut encoder = WebSocketCodec::new(WsRole::Client).with_max_frame_size(1 << 22);
            let mut wire = BytesMut::new();
            encoder
                .encode(WsFrame::binary(vec![0x42u8; size]), &mut wire)
                .unwrap();
            let wire = wire.freeze();

            let mut decoder = WebSocketCodec::new(WsRole::Server).with_max_frame_size(1 << 22);
            b.iter(|| {
                let mut buf = BytesMut::from(&wire[..]);
                black_box(decoder.decode(&mut buf).unwrap().unwrap());
            });
        });
    }

    group.finish();
}

fn bench_mask_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask_bytes");
    group.throughput(Throughput::Bytes(64 * 1024));

    group.bench_function("64k", |b| {
        let mut payload = vec![0x42u8; 64 * 1024];
        b.iter(|| {
            mask_bytes(black_box(&mut payload), [0xA5, 0x5A, 0x12, 0xEF]);
        });
    });

    group.finish();
}

fn bench_accept_key(c: &mut Criterion) {
    c.bench_function("accept_key", |b| {
        b.iter(|| {
            black_box(handshake::accept_key(black_box("dGhlIHNhbXBsZSBub25jZQ==")));
        });
    });
}

criterion_group!(
    benches,
    bench_encode_payload_sizes,
    bench_decode_payload_sizes,
    bench_mask_bytes,
    bench_accept_key,
);
criterion_main!(benches);
