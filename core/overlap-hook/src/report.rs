//! Failure reporting: a structured log event plus a human-readable stderr line.

use std::error::Error;

pub fn report(context: &str, err: &(dyn Error + 'static)) {
    tracing::error!(error = %err, chain = %error_chain(err), "{}", context);
    eprintln!("[Overlap] {}: {}", context, err);
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("[Overlap]   caused by: {}", cause);
        source = cause.source();
    }
}

fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
