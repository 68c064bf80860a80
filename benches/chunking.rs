use criterion::{Criterion, criterion_group, criterion_main};
use docs_rag::chunking::{DEFAULT_MAX_CHUNK_SIZE, split_into_chunks};
use std::hint::black_box;

fn synthetic_document() -> String {
    let paragraph = "The auth service issues signed tokens on login. Tokens expire after one hour\n\
                     Refresh tokens rotate on every use. Revoked sessions are rejected server side\n\
                     Clients are expected to retry with exponential backoff. Quotas apply per tenant\n";
    paragraph.repeat(400)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let document = synthetic_document();
    c.bench_function("chunking", |b| {
        b.iter(|| split_into_chunks(black_box(&document), black_box(DEFAULT_MAX_CHUNK_SIZE)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
