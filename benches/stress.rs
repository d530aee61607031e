use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parkd::clock::ManualClock;
use parkd::engine::{Engine, EngineError};
use parkd::idempotency::IdempotencyKey;
use parkd::model::{BookingRequest, Reservation, StoredResponse};

const HOUR: i64 = 3_600_000; // 1 hour in ms

async fn open_engine(dir: &tempfile::TempDir, name: &str) -> Arc<Engine> {
    let path = dir.path().join(format!("{name}.wal"));
    let engine = Engine::open(&path, Arc::new(ManualClock::new(0)))
        .await
        .expect("open failed");
    Arc::new(engine)
}

fn request(resource_id: u64, slot: i64) -> BookingRequest {
    BookingRequest {
        resource_id,
        holder_name: "bench".into(),
        holder_contact: "bench@example.com".into(),
        start: slot * HOUR,
        end: (slot + 1) * HOUR,
    }
}

fn render(result: &Result<Reservation, EngineError>) -> StoredResponse {
    match result {
        Ok(r) => StoredResponse::new(201, format!("{{\"id\":{}}}", r.id).into_bytes()),
        Err(e) => StoredResponse::new(409, e.to_string().into_bytes()),
    }
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

async fn phase1_sequential(dir: &tempfile::TempDir) {
    let engine = open_engine(dir, "sequential").await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        engine.book(request(1, i as i64)).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent(dir: &tempfile::TempDir) {
    let engine = open_engine(dir, "concurrent").await;
    let spots = engine.resources().await.len();
    let n_tasks = 12;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    // One spot per task: group commit shares each fsync across spots.
    for i in 0..n_tasks {
        let engine = engine.clone();
        let spot = (i % spots) as u64 + 1;
        handles.push(tokio::spawn(async move {
            for j in 0..n_per_task {
                engine.book(request(spot, j as i64)).await.unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_read_under_load(dir: &tempfile::TempDir) {
    let engine = open_engine(dir, "read_under_load").await;
    for i in 0..200 {
        engine.book(request(1, i)).await.unwrap();
    }

    // Writers fill spots 5..=9 in the background.
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5u64 {
        let engine = engine.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let _ = engine.book(request(5 + w, i)).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();

    for r in 0..n_readers {
        let engine = engine.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let slot = ((r * reads_per_reader + i) % 400) as i64;
                let t = Instant::now();
                engine
                    .available(None, Some(slot * HOUR), Some((slot + 2) * HOUR))
                    .await;
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("availability query", &mut all_latencies);
}

async fn phase4_retry_storm(dir: &tempfile::TempDir) {
    let engine = open_engine(dir, "retry_storm").await;
    let n_keys = 50;
    let retries_per_key = 20;

    let start = Instant::now();
    let mut handles = Vec::new();
    let fresh = Arc::new(AtomicUsize::new(0));

    for k in 0..n_keys {
        for _ in 0..retries_per_key {
            let engine = engine.clone();
            let fresh = fresh.clone();
            handles.push(tokio::spawn(async move {
                let key = IdempotencyKey::new(format!("retry-{k}")).unwrap();
                let spot = (k % 12) as u64 + 1;
                let outcome = engine
                    .book_idempotent(&key, request(spot, k as i64), render)
                    .await;
                if !outcome.is_replay() {
                    fresh.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let total = n_keys * retries_per_key;
    println!(
        "  {total} requests over {n_keys} keys: {} computed, {} replayed in {:.2}s",
        fresh.load(Ordering::Relaxed),
        total - fresh.load(Ordering::Relaxed),
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let dir = tempfile::tempdir().expect("tempdir failed");

    println!("=== parkd stress benchmark ===");
    println!("wal dir: {}\n", dir.path().display());

    println!("[phase 1] sequential write throughput");
    phase1_sequential(&dir).await;

    println!("\n[phase 2] concurrent write throughput");
    phase2_concurrent(&dir).await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load(&dir).await;

    println!("\n[phase 4] idempotent retry storm");
    phase4_retry_storm(&dir).await;

    println!("\n=== benchmark complete ===");
}
