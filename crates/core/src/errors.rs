use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("命令未找到: {id}")]
    CommandNotFound { id: i64 },

    #[error("工作流定义未找到: {id}")]
    ProcessDefinitionNotFound { id: i64 },

    #[error("工作流实例未找到: {id}")]
    ProcessInstanceNotFound { id: i64 },

    #[error("任务实例未找到: {id}")]
    TaskInstanceNotFound { id: i64 },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("检测到循环依赖: {0}")]
    CircularDependency(String),

    #[error("任务队列错误: {0}")]
    TaskQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("无效的命令参数: {0}")]
    InvalidCommandParam(String),

    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),

    #[error("表达式求值错误: {0}")]
    Expression(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_maps_to_serialization() {
        let err: SchedulerError = serde_json::from_str::<serde_json::Value>("{bad")
            .unwrap_err()
            .into();
        assert!(matches!(err, SchedulerError::Serialization(_)));
    }

    #[test]
    fn test_error_messages() {
        let err = SchedulerError::ProcessInstanceNotFound { id: 7 };
        assert_eq!(err.to_string(), "工作流实例未找到: 7");
    }
}
