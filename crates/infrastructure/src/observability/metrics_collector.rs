//! Metrics collector for the workflow master
//!
//! Handles are registered once against the global recorder; when no recorder
//! is installed every call is a no-op, so tests can use the collector freely.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::{debug, warn};

pub struct MetricsCollector {
    // Command metrics
    commands_handled_total: Counter,
    error_commands_total: Counter,

    // Process instance metrics
    process_instances_started_total: Counter,
    process_instances_finished_total: Counter,
    active_coordinators: Gauge,
    process_instance_duration: Histogram,

    // Task instance metrics
    tasks_submitted_total: Counter,
    task_retries_total: Counter,
    task_failures_total: Counter,
    task_timeouts_total: Counter,
    queue_depth: Gauge,
    coordinator_tick_duration: Histogram,

    // Fault tolerance metrics
    failovers_total: Counter,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            commands_handled_total: counter!("scheduler_commands_handled_total"),
            error_commands_total: counter!("scheduler_error_commands_total"),
            process_instances_started_total: counter!("scheduler_process_instances_started_total"),
            process_instances_finished_total: counter!(
                "scheduler_process_instances_finished_total"
            ),
            active_coordinators: gauge!("scheduler_active_coordinators"),
            process_instance_duration: histogram!("scheduler_process_instance_duration_seconds"),
            tasks_submitted_total: counter!("scheduler_tasks_submitted_total"),
            task_retries_total: counter!("scheduler_task_retries_total"),
            task_failures_total: counter!("scheduler_task_failures_total"),
            task_timeouts_total: counter!("scheduler_task_timeouts_total"),
            queue_depth: gauge!("scheduler_queue_depth"),
            coordinator_tick_duration: histogram!("scheduler_coordinator_tick_duration_seconds"),
            failovers_total: counter!("scheduler_failovers_total"),
        }
    }

    /// Record a command that was turned into a process instance
    pub fn record_command_handled(&self, command_type: &str) {
        self.commands_handled_total.increment(1);
        debug!(command_type = command_type, "Command handled");
    }

    /// Record a command moved to the error store
    pub fn record_error_command(&self, command_id: i64, reason: &str) {
        self.error_commands_total.increment(1);
        warn!(command_id = command_id, reason = reason, "Command moved to error store");
    }

    pub fn record_process_started(&self) {
        self.process_instances_started_total.increment(1);
        self.active_coordinators.increment(1.0);
    }

    /// Record a process instance reaching a final state
    pub fn record_process_finished(&self, state: &str, duration_seconds: f64) {
        self.process_instances_finished_total.increment(1);
        self.active_coordinators.decrement(1.0);
        self.process_instance_duration.record(duration_seconds);
        debug!(
            state = state,
            duration_seconds = duration_seconds,
            "Process instance finished"
        );
    }

    pub fn record_task_submitted(&self) {
        self.tasks_submitted_total.increment(1);
    }

    pub fn record_task_retry(&self, task_name: &str, retry_times: i32) {
        self.task_retries_total.increment(1);
        debug!(task_name = task_name, retry_times = retry_times, "Task retry scheduled");
    }

    pub fn record_task_failure(&self, task_name: &str) {
        self.task_failures_total.increment(1);
        warn!(task_name = task_name, "Task instance failed");
    }

    pub fn record_task_timeout(&self, task_name: &str) {
        self.task_timeouts_total.increment(1);
        warn!(task_name = task_name, "Task instance timed out");
    }

    /// Record how long one coordinator polling pass took
    pub fn record_coordinator_tick(&self, duration_seconds: f64) {
        self.coordinator_tick_duration.record(duration_seconds);
    }

    pub fn update_queue_depth(&self, depth: f64) {
        self.queue_depth.set(depth);
    }

    /// Record the number of instances taken over during a failover pass
    pub fn record_failover(&self, host: &str, instances: u64) {
        self.failovers_total.increment(instances);
        warn!(host = host, instances = instances, "Failover performed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_without_recorder() {
        let metrics = MetricsCollector::new();
        metrics.record_process_started();
        metrics.record_task_timeout("t1");
        metrics.record_coordinator_tick(0.01);
        metrics.record_process_finished("SUCCESS", 1.5);
    }
}
