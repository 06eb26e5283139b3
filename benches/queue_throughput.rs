//! Event queue throughput benchmark.
//!
//! Measures push/pop latency, route-first delivery and a full
//! orchestrator drain using Criterion.

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use careflow_core::{Agent, AgentContext, EventQueue, Message, Orchestrator};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug)]
struct EchoAgent {
    context: AgentContext,
}

#[async_trait]
impl Agent for EchoAgent {
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn process_message(&self, message: Message) -> Value {
        message.data
    }
}

fn echo(agent_id: &str) -> Arc<EchoAgent> {
    Arc::new(EchoAgent {
        context: AgentContext::new(agent_id, "bench", ["receive"]),
    })
}

fn message(i: usize) -> Message {
    Message::new("bench", "echo", "ping", json!({"seq": i}))
}

fn bench_push_pop(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let batch_sizes: &[usize] = &[1, 64, 1024];

    let mut group = c.benchmark_group("push_pop");
    for &size in batch_sizes {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &n| {
            b.iter(|| {
                rt.block_on(async {
                    let queue = EventQueue::new();
                    for i in 0..n {
                        queue.push(message(i)).await.unwrap();
                    }
                    while let Some(m) = queue.pop().await {
                        black_box(m);
                    }
                })
            });
        });
    }
    group.finish();
}

fn bench_direct_delivery(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orchestrator = Orchestrator::new();
    rt.block_on(orchestrator.register_agent(echo("echo"))).unwrap();

    c.bench_function("submit_direct", |b| {
        b.iter(|| rt.block_on(async { orchestrator.submit(black_box(message(0))).await.unwrap() }));
    });
}

fn bench_orchestrator_drain(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orchestrator = Orchestrator::new();
    rt.block_on(orchestrator.register_agent(echo("echo"))).unwrap();

    c.bench_function("drain_1024", |b| {
        b.iter(|| {
            rt.block_on(async {
                for i in 0..1024 {
                    orchestrator.queue().push(message(i)).await.unwrap();
                }
                black_box(orchestrator.run_until_idle().await)
            })
        });
    });
}

criterion_group!(
    benches,
    bench_push_pop,
    bench_direct_delivery,
    bench_orchestrator_drain
);
criterion_main!(benches);
