use flagged_errors::{
    log_error_with_names, BoxError, ClassificationRegistry, ClassifierConfig, ErrFlag, ErrorBuilder, ErrorLog,
    ResultExt, StructuredError,
};
use std::error::Error;
use std::fmt;

/// Domain error raised by the storage layer.
#[derive(Debug)]
struct OrderMissing {
    order_id: u64,
}

impl fmt::Display for OrderMissing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order {} could not be loaded", self.order_id)
    }
}

impl Error for OrderMissing {}

fn load_order(order_id: u64) -> Result<String, OrderMissing> {
    if order_id == 17 {
        return Ok("order #17".to_string());
    }
    Err(OrderMissing { order_id })
}

fn main() -> Result<(), Box<dyn Error>> {
    let config = ClassifierConfig::from_json_str(
        r#"{
            "trace_mode": "caller",
            "flag_names": { "128": "rate limited" }
        }"#,
    )?;
    let registry = ClassificationRegistry::with_config(config)?;

    // 1. Classify a domain type once, at startup
    registry.flags().set_flags_by_type::<OrderMissing>(ErrFlag::NOT_FOUND);

    println!("--- Wrapping ---\n");
    let err = load_order(42).wrap_err(&registry, "GET /orders/42").unwrap_err();
    println!("   {}", err);
    println!("   status: {} {}", err.code(), err.title());

    // 2. Wrapping again keeps the status and records another hop
    let err = registry.wrap_with_message(err, "api gateway");
    println!("   message after re-wrap: {}", err.message());
    println!("   trace: {:?}", err.trace().lines());

    println!("\n--- Merging ---\n");
    let rejected = ErrorBuilder::new()
        .with_flags(ErrFlag::BAD_REQUEST)
        .error("quantity must be positive");
    let failures: Vec<Option<BoxError>> = vec![
        Some(Box::new(registry.wrap(rejected)) as BoxError),
        None,
        Some(Box::new(registry.wrap(OrderMissing { order_id: 7 })) as BoxError),
    ];
    if let Some(merged) = registry.merge(failures) {
        if let Some(merged) = merged.downcast_ref::<StructuredError>() {
            println!("   {}", merged);

            println!("\n--- Payload ---\n");
            println!("{}", registry.payload(merged)?);

            println!("\n--- Log line ---\n");
            println!("   {}", ErrorLog::with_names(merged, registry.names()));
            log_error_with_names(merged, registry.names());
        }
    }

    match load_order(17) {
        Ok(order) => println!("\nloaded {order}"),
        Err(e) => println!("\nunexpected: {}", registry.wrap(e)),
    }

    Ok(())
}
