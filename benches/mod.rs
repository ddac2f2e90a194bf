use criterion::{criterion_group, criterion_main};

mod network;

criterion_group!(
    benches,
    network::mqtt::bench_encode_publish,
    network::mqtt::bench_decode_publish,
    network::mqtt::bench_poll_qos0,
    network::mqtt::bench_poll_qos1,
    session::bench_tick_connected,
    session::bench_reconnect_and_resubscribe
);
criterion_main!(benches);
