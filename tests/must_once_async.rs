#![cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use must_once::MustOnce;

async fn explode(msg: &'static str) -> Result<(), ()> {
   panic!("{msg}")
}

#[tokio::test]
async fn test_call_async() {
   let once = MustOnce::new();
   let counter = Arc::new(AtomicUsize::new(0));

   once
      .call_async(|| {
         let counter = Arc::clone(&counter);
         async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Err("async fail")
         }
      })
      .await;
   assert!(!once.is_done());
   assert_eq!(counter.load(Ordering::SeqCst), 1);

   once
      .call_async(|| {
         let counter = Arc::clone(&counter);
         async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, &str>(())
         }
      })
      .await;
   assert!(once.is_done());
   assert_eq!(counter.load(Ordering::SeqCst), 2);

   // Closed: the future is never created.
   once
      .call_async(|| async {
         counter.fetch_add(1, Ordering::SeqCst);
         Ok::<_, &str>(())
      })
      .await;
   assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_call_async_concurrent() {
   let once = Arc::new(MustOnce::new());
   let counter = Arc::new(AtomicUsize::new(0));
   let tasks: Vec<_> = (0..10)
      .map(|_| {
         let once = Arc::clone(&once);
         let counter = Arc::clone(&counter);
         tokio::spawn(async move {
            once
               .call_async(|| {
                  let counter = Arc::clone(&counter);
                  async move {
                     counter.fetch_add(1, Ordering::SeqCst);
                     tokio::time::sleep(Duration::from_millis(20)).await;
                     Ok::<_, ()>(())
                  }
               })
               .await;
            counter.load(Ordering::SeqCst)
         })
      })
      .collect();

   for task in tasks {
      assert_eq!(task.await.unwrap(), 1);
   }
   assert!(once.is_done());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_call_async_panic_closes_gate() {
   let once = Arc::new(MustOnce::new());

   let task = {
      let once = Arc::clone(&once);
      tokio::spawn(async move {
         once
            .call_async(|| explode("async attempt panics"))
            .await;
      })
   };
   let err = task.await.unwrap_err();
   assert!(err.is_panic());
   assert!(once.is_done());

   once.call_async(|| explode("Should not be called")).await;
}

#[tokio::test]
async fn test_call_async_dropped_attempt_closes_gate() {
   let once = MustOnce::new();

   let attempt = once.call_async(|| async {
      tokio::time::sleep(Duration::from_secs(60)).await;
      Err::<(), _>("never finishes")
   });
   let timed_out = tokio::time::timeout(Duration::from_millis(10), attempt).await;
   assert!(timed_out.is_err());
   assert!(once.is_done());
}

#[tokio::test]
async fn test_call_async_contended_on_current_thread() {
   // The waiter outlasts every yield round while the holder sleeps; on a
   // current-thread runtime it must keep yielding instead of blocking.
   let once = Arc::new(MustOnce::new());
   let started = Arc::new(AtomicBool::new(false));

   let holder = {
      let once = Arc::clone(&once);
      let started = Arc::clone(&started);
      tokio::spawn(async move {
         once
            .call_async(|| async move {
               started.store(true, Ordering::SeqCst);
               tokio::time::sleep(Duration::from_millis(100)).await;
               Err::<(), _>("holder fails")
            })
            .await;
      })
   };

   while !started.load(Ordering::SeqCst) {
      tokio::task::yield_now().await;
   }

   let ran = AtomicBool::new(false);
   once
      .call_async(|| async {
         ran.store(true, Ordering::SeqCst);
         Ok::<_, &str>(())
      })
      .await;

   holder.await.unwrap();
   assert!(ran.load(Ordering::SeqCst), "waiter must retry after the failed attempt");
   assert!(once.is_done());
}

#[cfg(not(feature = "async-tokio-mt"))]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_call_async_yield_only_waiters() {
   const FAILURES: usize = 3;

   let once = Arc::new(MustOnce::new());
   let invocations = Arc::new(AtomicUsize::new(0));
   let tasks: Vec<_> = (0..8)
      .map(|_| {
         let once = Arc::clone(&once);
         let invocations = Arc::clone(&invocations);
         tokio::spawn(async move {
            while !once.is_done() {
               once
                  .call_async(|| {
                     let invocations = Arc::clone(&invocations);
                     async move {
                        let n = invocations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        if n < FAILURES {
                           Err(n)
                        } else {
                           Ok(())
                        }
                     }
                  })
                  .await;
            }
         })
      })
      .collect();

   for task in tasks {
      task.await.unwrap();
   }
   assert!(once.is_done());
   assert_eq!(invocations.load(Ordering::SeqCst), FAILURES + 1);
}
