use shared::metrics_defs::{MetricDef, MetricType};

pub const ACCOUNTS_REGISTERED: MetricDef = MetricDef {
    name: "accounts.registered",
    metric_type: MetricType::Counter,
    description: "Number of accounts created through registration",
};

pub const LOGIN_SUCCESS: MetricDef = MetricDef {
    name: "accounts.login.success",
    metric_type: MetricType::Counter,
    description: "Number of logins that issued a token",
};

pub const LOGIN_FAILURE: MetricDef = MetricDef {
    name: "accounts.login.failure",
    metric_type: MetricType::Counter,
    description: "Number of rejected logins. Tagged with reason.",
};

pub const ALL_METRICS: &[MetricDef] = &[ACCOUNTS_REGISTERED, LOGIN_SUCCESS, LOGIN_FAILURE];
