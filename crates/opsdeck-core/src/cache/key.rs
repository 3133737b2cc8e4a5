use std::fmt;

/// Identifies one cached statistics value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatsKey {
    DashboardStats,
    SystemMetrics,
    SystemStats,
    ActivityStats { days: u32 },
}

impl fmt::Display for StatsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsKey::DashboardStats => write!(f, "dashboardStats"),
            StatsKey::SystemMetrics => write!(f, "systemMetrics"),
            StatsKey::SystemStats => write!(f, "systemStats"),
            StatsKey::ActivityStats { days } => write!(f, "activityStats_{}", days),
        }
    }
}
