//! Endpoint families of the stamp and SRC20 indexers

use stampline_core::Endpoint;

use crate::job::Job;

pub const OPENSTAMP_API: &str = "https://openstamp.io/api/v1/";
pub const STAMPCHAIN_API: &str = "https://stampchain.io/api/v2/";

/// Page limit sent to the SRC20 action listing
pub const DEFAULT_ACTIONS_LIMIT: usize = 5000;

/// Base URLs of the indexers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub openstamp: String,
    pub stampchain: String,
    pub actions_limit: usize,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            openstamp: OPENSTAMP_API.to_string(),
            stampchain: STAMPCHAIN_API.to_string(),
            actions_limit: DEFAULT_ACTIONS_LIMIT,
        }
    }
}

impl Endpoints {
    /// Point both indexers at one base URL (mock servers, proxies)
    pub fn single_base(base: &str) -> Self {
        Self {
            openstamp: base.to_string(),
            stampchain: base.to_string(),
            ..Default::default()
        }
    }

    /// Endpoint serving `job`. `page_size` applies to counted endpoints only.
    pub fn for_job(&self, job: Job, page_size: usize) -> Endpoint {
        match job {
            Job::Src20Holders => Endpoint::counted(
                join(&self.openstamp, "explorer/src20/holdersByTick"),
                page_size,
            )
            .with_id_param("tick"),
            Job::StampHolders => {
                Endpoint::single(join(&self.stampchain, "stamps/{id}"), "/data/holders")
            }
            Job::Balances => Endpoint::single(join(&self.stampchain, "src20/balance/{id}"), "/data"),
            Job::Actions => Endpoint::total_pages(join(&self.stampchain, "src20/tick/{id}"))
                .with_query("limit", self.actions_limit.to_string()),
        }
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{path}", base.trim_end_matches('/'))
}
