use serde::{Deserialize, Serialize};

/// 为以VARCHAR列存储的枚举生成字符串转换与sqlx编解码实现
macro_rules! varchar_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {}: {s}", stringify!($name))),
                }
            }
        }

        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                s.parse::<$name>().map_err(Into::into)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

/// 命令类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    StartProcess,
    StartCurrentTaskProcess,
    RecoverToleranceFaultProcess,
    RecoverSuspendedProcess,
    StartFailureTaskProcess,
    ComplementData,
    Scheduler,
    RepeatRunning,
    RecoverWaitingThread,
}

varchar_enum!(CommandType {
    StartProcess => "START_PROCESS",
    StartCurrentTaskProcess => "START_CURRENT_TASK_PROCESS",
    RecoverToleranceFaultProcess => "RECOVER_TOLERANCE_FAULT_PROCESS",
    RecoverSuspendedProcess => "RECOVER_SUSPENDED_PROCESS",
    StartFailureTaskProcess => "START_FAILURE_TASK_PROCESS",
    ComplementData => "COMPLEMENT_DATA",
    Scheduler => "SCHEDULER",
    RepeatRunning => "REPEAT_RUNNING",
    RecoverWaitingThread => "RECOVER_WAITING_THREAD",
});

/// 工作流实例与任务实例共用的执行状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    SubmittedSuccess,
    RunningExecution,
    ReadyPause,
    Pause,
    ReadyStop,
    Stop,
    Failure,
    Success,
    NeedFaultTolerance,
    Kill,
    WaitingThread,
    WaitingDepend,
    DelayExecution,
    ForcedSuccess,
}

varchar_enum!(ExecutionStatus {
    SubmittedSuccess => "SUBMITTED_SUCCESS",
    RunningExecution => "RUNNING_EXECUTION",
    ReadyPause => "READY_PAUSE",
    Pause => "PAUSE",
    ReadyStop => "READY_STOP",
    Stop => "STOP",
    Failure => "FAILURE",
    Success => "SUCCESS",
    NeedFaultTolerance => "NEED_FAULT_TOLERANCE",
    Kill => "KILL",
    WaitingThread => "WAITING_THREAD",
    WaitingDepend => "WAITING_DEPEND",
    DelayExecution => "DELAY_EXECUTION",
    ForcedSuccess => "FORCED_SUCCESS",
});

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::ForcedSuccess)
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Failure | ExecutionStatus::NeedFaultTolerance
        )
    }

    pub fn is_cancel(&self) -> bool {
        matches!(self, ExecutionStatus::Kill | ExecutionStatus::Stop)
    }

    pub fn is_pause(&self) -> bool {
        matches!(self, ExecutionStatus::Pause)
    }

    pub fn is_waiting_thread(&self) -> bool {
        matches!(self, ExecutionStatus::WaitingThread)
    }

    /// 终态: 成功、失败、取消、暂停或等待线程
    pub fn is_finished(&self) -> bool {
        self.is_success()
            || self.is_failure()
            || self.is_cancel()
            || self.is_pause()
            || self.is_waiting_thread()
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::SubmittedSuccess
                | ExecutionStatus::RunningExecution
                | ExecutionStatus::DelayExecution
                | ExecutionStatus::ReadyPause
                | ExecutionStatus::ReadyStop
                | ExecutionStatus::WaitingDepend
        )
    }
}

/// 通用的是/否标记
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Flag {
    #[default]
    Yes,
    No,
}

varchar_enum!(Flag {
    Yes => "YES",
    No => "NO",
});

/// 任务失败后的工作流处理策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureStrategy {
    #[default]
    End,
    Continue,
}

varchar_enum!(FailureStrategy {
    End => "END",
    Continue => "CONTINUE",
});

/// 工作流结束告警策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningType {
    #[default]
    None,
    Success,
    Failure,
    All,
}

varchar_enum!(WarningType {
    None => "NONE",
    Success => "SUCCESS",
    Failure => "FAILURE",
    All => "ALL",
});

impl WarningType {
    /// 判断指定终态是否需要发送结束告警
    pub fn should_alert(&self, state: ExecutionStatus) -> bool {
        match self {
            WarningType::None => false,
            WarningType::All => true,
            WarningType::Success => state.is_success(),
            WarningType::Failure => state.is_failure(),
        }
    }
}

/// 启动节点的依赖范围
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum TaskDependType {
    #[serde(rename = "TASK_ONLY")]
    TaskOnly,
    #[serde(rename = "TASK_PRE")]
    TaskPre,
    #[default]
    #[serde(rename = "TASK_POST")]
    TaskPost,
}

varchar_enum!(TaskDependType {
    TaskOnly => "TASK_ONLY",
    TaskPre => "TASK_PRE",
    TaskPost => "TASK_POST",
});

/// 优先级，序号越小优先级越高
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Highest,
    High,
    #[default]
    Medium,
    Low,
    Lowest,
}

varchar_enum!(Priority {
    Highest => "HIGHEST",
    High => "HIGH",
    Medium => "MEDIUM",
    Low => "LOW",
    Lowest => "LOWEST",
});

impl Priority {
    pub fn ordinal(&self) -> i32 {
        match self {
            Priority::Highest => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
            Priority::Lowest => 4,
        }
    }
}

/// DAG节点的运行标记
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunFlag {
    #[default]
    Normal,
    Forbidden,
}

/// 任务超时处理策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeoutStrategy {
    #[default]
    Warn,
    Failed,
    Warnfailed,
}

impl TimeoutStrategy {
    pub fn should_alert(&self) -> bool {
        matches!(self, TimeoutStrategy::Warn | TimeoutStrategy::Warnfailed)
    }

    pub fn should_fail(&self) -> bool {
        matches!(self, TimeoutStrategy::Failed | TimeoutStrategy::Warnfailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_status_predicates() {
        assert!(ExecutionStatus::NeedFaultTolerance.is_failure());
        assert!(ExecutionStatus::Kill.is_cancel());
        assert!(ExecutionStatus::WaitingThread.is_finished());
        assert!(!ExecutionStatus::ReadyStop.is_finished());
        assert!(ExecutionStatus::ForcedSuccess.is_success());
    }

    #[test]
    fn test_enum_string_round_trip() {
        assert_eq!(
            "RECOVER_WAITING_THREAD".parse::<CommandType>(),
            Ok(CommandType::RecoverWaitingThread)
        );
        assert_eq!(ExecutionStatus::NeedFaultTolerance.as_str(), "NEED_FAULT_TOLERANCE");
        assert!("UNKNOWN".parse::<Flag>().is_err());
    }

    #[test]
    fn test_serde_matches_column_text() {
        let json = serde_json::to_string(&TaskDependType::TaskOnly).unwrap();
        assert_eq!(json, "\"TASK_ONLY\"");
        let json = serde_json::to_string(&CommandType::ComplementData).unwrap();
        assert_eq!(json, "\"COMPLEMENT_DATA\"");
    }

    #[test]
    fn test_priority_ordinal() {
        assert_eq!(Priority::Highest.ordinal(), 0);
        assert_eq!(Priority::Lowest.ordinal(), 4);
        assert!(Priority::High < Priority::Low);
    }

    #[test]
    fn test_warning_type_should_alert() {
        assert!(WarningType::All.should_alert(ExecutionStatus::Stop));
        assert!(WarningType::Failure.should_alert(ExecutionStatus::Failure));
        assert!(!WarningType::Success.should_alert(ExecutionStatus::Failure));
        assert!(!WarningType::None.should_alert(ExecutionStatus::Success));
    }
}
