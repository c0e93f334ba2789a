use std::sync::atomic::{AtomicUsize, Ordering};

use must_once::MustOnce;
use tracing_subscriber::EnvFilter;

static CONNECT: MustOnce = MustOnce::new();
static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

fn connect(fail: bool) {
   CONNECT.call(|| {
      let attempt = ATTEMPTS.fetch_add(1, Ordering::SeqCst) + 1;
      println!("Attempting connection #{attempt} (fail={fail})...");
      if fail {
         // `call` drops the error, so report it here.
         eprintln!("Connection failed!");
         Err("connection refused")
      } else {
         Ok(())
      }
   })
}

fn main() {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env())
      .init();

   // First attempt fails, gate stays open
   connect(true);
   assert!(!CONNECT.is_done());

   // Second attempt succeeds
   connect(false);
   assert!(CONNECT.is_done());

   // Subsequent attempts are skipped, even failing ones
   connect(true);
   assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
   println!("Connected after {} attempts", ATTEMPTS.load(Ordering::SeqCst));
}
