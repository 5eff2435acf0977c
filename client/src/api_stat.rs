//! Scoped per-call statistics recorder

use std::sync::Arc;

use polaris_core::{ApiKind, ReturnCode, StatReporter};
use tokio::time::Instant;

use crate::context::Context;

/// Latency/return-code accounting for one API call
///
/// The clock starts at construction. [`ApiStat::record`] consumes the scope,
/// so an outcome can be recorded at most once; dropping an unrecorded scope
/// is a no-op.
pub(crate) struct ApiStat {
    reporter: Arc<dyn StatReporter>,
    api: ApiKind,
    begin: Instant,
}

impl ApiStat {
    pub(crate) fn new(context: &Context, api: ApiKind) -> Self {
        Self {
            reporter: context.stat_reporter(),
            api,
            begin: Instant::now(),
        }
    }

    pub(crate) fn record(self, code: ReturnCode) {
        self.reporter
            .report_api_call(self.api, code, self.begin.elapsed());
    }
}
