use std::sync::Arc;

use must_once::{Context, MustOnce};
use tracing_subscriber::EnvFilter;

fn handle(ctx: Context, schema: &MustOnce) {
   let _span = ctx.span().entered();
   schema.call(|| {
      tracing::info!(tag = %ctx.log_tag(), "migrating schema");
      Ok::<_, std::io::Error>(())
   });
   tracing::info!(tag = %ctx.log_tag(), "request handled");
}

fn main() {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
      .init();

   let schema = Arc::new(MustOnce::new());
   let root = Context::new().with_uuid("").with_log_tag("service", "demo");

   let workers: Vec<_> = (0..3)
      .map(|i| {
         let ctx = root.with_log_tag("worker", &i.to_string());
         let schema = Arc::clone(&schema);
         std::thread::spawn(move || handle(ctx, &schema))
      })
      .collect();

   for w in workers {
      w.join().unwrap();
   }
   assert!(schema.is_done());
   println!("root tag unchanged: {}", root.log_tag());
}
