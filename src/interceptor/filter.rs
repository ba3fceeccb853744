//! Call filter predicates.
//!
//! A filter sees the inbound context and the full method name before any
//! reporting work happens. Returning `false` bypasses the layer entirely.

use std::collections::HashSet;
use std::sync::Arc;

use crate::call::CallContext;

pub type Filter = Arc<dyn Fn(&CallContext, &str) -> bool + Send + Sync>;

/// Instrument every call.
pub fn allow_all() -> Filter {
    Arc::new(|_: &CallContext, _: &str| true)
}

/// Instrument every call except the listed `/service/method` names.
pub fn exclude_methods<I, M>(methods: I) -> Filter
where
    I: IntoIterator<Item = M>,
    M: Into<String>,
{
    let excluded: HashSet<String> = methods.into_iter().map(Into::into).collect();
    Arc::new(move |_: &CallContext, full_method: &str| !excluded.contains(full_method))
}

pub fn from_fn<F>(f: F) -> Filter
where
    F: Fn(&CallContext, &str) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::Metadata;

    #[test]
    fn test_exclude_methods() {
        let filter = exclude_methods(["/grpc.health.v1.Health/Check"]);
        let ctx = CallContext::default();
        assert!(!filter(&ctx, "/grpc.health.v1.Health/Check"));
        assert!(filter(&ctx, "/Echo/Ping"));
        assert!(allow_all()(&ctx, "/grpc.health.v1.Health/Check"));
    }

    #[test]
    fn test_filter_sees_metadata() {
        let filter = from_fn(|ctx, _| !ctx.metadata().contains_key("x-no-trace"));
        let quiet = CallContext::new(Metadata::from_pairs([("x-no-trace", "1")]).unwrap());
        assert!(!filter(&quiet, "/Echo/Ping"));
        assert!(filter(&CallContext::default(), "/Echo/Ping"));
    }
}
