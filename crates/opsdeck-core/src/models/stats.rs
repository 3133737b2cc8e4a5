use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(rename = "totalUsers", default)]
    pub total_users: u64,
    #[serde(rename = "activeUsers", default)]
    pub active_users: u64,
    #[serde(rename = "newUsersToday", default)]
    pub new_users_today: u64,
    #[serde(rename = "totalRequests", default)]
    pub total_requests: u64,
    #[serde(rename = "errorRate", default)]
    pub error_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    #[serde(rename = "cpuUsage", default)]
    pub cpu_usage: f64,
    #[serde(rename = "memoryUsage", default)]
    pub memory_usage: f64,
    #[serde(rename = "diskUsage", default)]
    pub disk_usage: f64,
    #[serde(rename = "uptimeSeconds", default)]
    pub uptime_seconds: u64,
}

impl SystemMetrics {
    /// Format uptime as "3d 4h" / "4h 12m" / "12m"
    pub fn uptime_display(&self) -> String {
        let minutes = self.uptime_seconds / 60;
        let hours = minutes / 60;
        let days = hours / 24;
        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else {
            format!("{}m", minutes)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub version: Option<String>,
    #[serde(rename = "totalRecords", default)]
    pub total_records: u64,
    #[serde(rename = "storageBytes", default)]
    pub storage_bytes: u64,
    #[serde(rename = "queueDepth", default)]
    pub queue_depth: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPoint {
    pub date: NaiveDate,
    #[serde(default)]
    pub logins: u64,
    #[serde(default)]
    pub actions: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityStats {
    #[serde(default)]
    pub days: u32,
    #[serde(default)]
    pub points: Vec<ActivityPoint>,
}

impl ActivityStats {
    pub fn total_logins(&self) -> u64 {
        self.points.iter().map(|p| p.logins).sum()
    }

    pub fn total_actions(&self) -> u64 {
        self.points.iter().map(|p| p.actions).sum()
    }
}

/// A cached statistics value. The cache key decides which variant is stored.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsSnapshot {
    Dashboard(DashboardStats),
    SystemMetrics(SystemMetrics),
    SystemStats(SystemStats),
    Activity(ActivityStats),
}

impl StatsSnapshot {
    pub fn kind(&self) -> &'static str {
        match self {
            StatsSnapshot::Dashboard(_) => "dashboard",
            StatsSnapshot::SystemMetrics(_) => "system metrics",
            StatsSnapshot::SystemStats(_) => "system stats",
            StatsSnapshot::Activity(_) => "activity",
        }
    }
}
