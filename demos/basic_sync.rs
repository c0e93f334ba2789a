use std::sync::atomic::{AtomicUsize, Ordering};

use must_once::MustOnce;

static COUNTER: AtomicUsize = AtomicUsize::new(0);
static SETUP: MustOnce = MustOnce::new();

fn ensure_setup() {
   SETUP.call(|| {
      // This closure runs only once
      COUNTER.fetch_add(1, Ordering::Relaxed);
      println!("Running setup...");
      std::thread::sleep(std::time::Duration::from_millis(50));
      Ok::<_, std::io::Error>(())
   })
}

fn main() {
   let threads: Vec<_> = (0..5)
      .map(|i| {
         std::thread::spawn(move || {
            ensure_setup();
            println!("Thread {i} sees setup done: {}", SETUP.is_done());
         })
      })
      .collect();

   for t in threads {
      t.join().unwrap();
   }

   assert!(SETUP.is_done());
   assert_eq!(COUNTER.load(Ordering::Relaxed), 1); // Setup ran only once
}
