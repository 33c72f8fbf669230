use criterion::{black_box, criterion_group, criterion_main, Criterion};

use std::io::Cursor;

use omexml::meta::OmeMetadata;
use omexml::prelude::*;
use omexml::{CompressionType, OmeXmlReader, OmeXmlWriter, PixelType, PlaneGeometry, Region};

const SIZE_X: usize = 256;
const SIZE_Y: usize = 256;
const N_PLANES: usize = 16;

fn plane(seed: usize) -> Vec<u8> {
    (0..SIZE_X * SIZE_Y * 2)
        .map(|i| ((i / 64 + seed) % 251) as u8)
        .collect()
}

fn write_document(compression: CompressionType) -> Vec<u8> {
    let mut metadata = OmeMetadata::new();
    metadata.add_image(
        None,
        PlaneGeometry::new(SIZE_X, SIZE_Y, PixelType::Uint16).with_sizes(N_PLANES, 1, 1),
    );
    let mut buffer = Vec::new();
    {
        let mut writer = OmeXmlWriter::new(&mut buffer, metadata).unwrap();
        writer.set_compression(compression).unwrap();
        for p in 0..N_PLANES {
            writer
                .write_plane(0, p, &plane(p), &Region::full(SIZE_X, SIZE_Y))
                .unwrap();
        }
        writer.close().unwrap();
    }
    buffer
}

fn read_all(document: &[u8]) -> usize {
    let mut reader = OmeXmlReader::new(Cursor::new(document)).unwrap();
    reader.iter_planes(0).map(|p| p.unwrap().len()).sum()
}

fn index_only(document: &[u8]) -> usize {
    let reader = OmeXmlReader::new(Cursor::new(document)).unwrap();
    reader.block_count()
}

fn omexml_reading(c: &mut Criterion) {
    let uncompressed = write_document(CompressionType::NoCompression);
    let zlib = write_document(CompressionType::Zlib);
    c.bench_function("index_uncompressed", |b| {
        b.iter(|| index_only(black_box(&uncompressed)))
    });
    c.bench_function("read_uncompressed", |b| {
        b.iter(|| read_all(black_box(&uncompressed)))
    });
    c.bench_function("read_zlib", |b| b.iter(|| read_all(black_box(&zlib))));
}

fn omexml_writing(c: &mut Criterion) {
    c.bench_function("write_uncompressed", |b| {
        b.iter(|| write_document(black_box(CompressionType::NoCompression)))
    });
    c.bench_function("write_zlib", |b| {
        b.iter(|| write_document(black_box(CompressionType::Zlib)))
    });
}

criterion_group!(benches, omexml_reading, omexml_writing);
criterion_main!(benches);
