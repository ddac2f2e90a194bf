use super::{FrozenClock, MemoryConnector};
use criterion::{BatchSize, Criterion, Throughput};
use mqtt_session::network::mqtt::packet;
use mqtt_session::network::mqtt::{Client, ConnectOptions, ProtocolClient, QoS};
use std::hint::black_box;

const TOPIC: &str = "bench/sensor/temperature";

fn connected_client() -> (Client<MemoryConnector, FrozenClock>, super::Inbound) {
    let (connector, inbound) = MemoryConnector::new();
    let mut client = Client::new(connector, FrozenClock);
    client
        .set_server("bench.local", 1883)
        .expect("Failed to set server");
    client
        .connect(&ConnectOptions {
            client_id: "bench",
            username: "",
            password: "",
            clean_session: true,
            keep_alive_seconds: 60,
        })
        .expect("Failed to connect");
    (client, inbound)
}

fn frame_bytes(qos: QoS, packet_id: u16, payload: &[u8]) -> Vec<u8> {
    let frame = packet::publish(TOPIC, payload, qos, false, packet_id).expect("Failed to encode");
    let mut bytes = frame.header().to_vec();
    bytes.extend_from_slice(frame.body());
    bytes
}

pub fn bench_encode_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_publish");
    let payload = [0x5Au8; 256];
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("qos1_retained", |b| {
        b.iter(|| {
            packet::publish(
                black_box(TOPIC),
                black_box(&payload),
                QoS::AtLeastOnce,
                true,
                1,
            )
            .expect("Failed to encode")
        })
    });
    group.finish();
}

pub fn bench_decode_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_publish");
    let frame =
        packet::publish(TOPIC, &[0xA5; 256], QoS::AtLeastOnce, false, 42).expect("Failed to encode");
    let first = frame.header()[0];
    let body = frame.body();
    group.throughput(Throughput::Bytes(body.len() as u64));
    group.bench_function("qos1", |b| {
        b.iter(|| packet::decode_publish(black_box(first), black_box(body)).expect("Failed to decode"))
    });
    group.finish();
}

fn bench_poll(c: &mut Criterion, name: &str, qos: QoS) {
    let mut group = c.benchmark_group(name);
    let payload = b"hello world from bench";
    let burst: Vec<u8> = (1..=8)
        .flat_map(|id| frame_bytes(qos, id, payload))
        .collect();
    group.throughput(Throughput::Bytes(payload.len() as u64 * 8));
    group.bench_function("burst_of_8", |b| {
        b.iter_batched_ref(
            || {
                let (client, inbound) = connected_client();
                inbound.borrow_mut().extend(burst.iter().copied());
                client
            },
            |client| {
                let mut received = 0usize;
                client
                    .poll(&mut |_: &str, payload: &[u8]| received += payload.len())
                    .expect("Failed to poll");
                black_box(received)
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

pub fn bench_poll_qos0(c: &mut Criterion) {
    bench_poll(c, "poll_qos0", QoS::AtMostOnce);
}

pub fn bench_poll_qos1(c: &mut Criterion) {
    bench_poll(c, "poll_qos1", QoS::AtLeastOnce);
}
