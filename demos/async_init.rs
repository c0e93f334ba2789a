use std::sync::atomic::{AtomicUsize, Ordering};

use must_once::MustOnce;
use tokio::time::{sleep, Duration};

static COUNTER: AtomicUsize = AtomicUsize::new(0);
static WARMUP: MustOnce = MustOnce::new();

async fn warm_up() {
   WARMUP
      .call_async(|| async {
         // Fails on the first run, succeeds on the second
         let run = COUNTER.fetch_add(1, Ordering::SeqCst);
         println!("Warming up cache (run {run})...");
         sleep(Duration::from_millis(50)).await;
         if run == 0 {
            Err("cache backend not ready")
         } else {
            Ok(())
         }
      })
      .await
}

#[tokio::main]
async fn main() {
   let tasks: Vec<_> = (0..5)
      .map(|i| {
         tokio::spawn(async move {
            warm_up().await;
            println!("Task {i} done, warmed up: {}", WARMUP.is_done());
         })
      })
      .collect();

   for t in tasks {
      t.await.unwrap();
   }

   assert!(WARMUP.is_done());
   assert_eq!(COUNTER.load(Ordering::SeqCst), 2); // One failure, one success
}
