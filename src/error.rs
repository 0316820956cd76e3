// 错误类型定义 - 试戴流程与持久化层的错误分类

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 试戴流程阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// 阶段一：风格描述
    Describe,
    /// 阶段二：合成生成
    Compose,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Describe => f.write_str("发型描述"),
            PipelineStage::Compose => f.write_str("试戴图生成"),
        }
    }
}

/// 试戴控制器错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TryOnError {
    /// 缺少必要输入（在任何网络调用之前发现）
    #[error("输入校验失败: {0}")]
    Validation(String),

    /// 外部服务阶段失败，流程终止，不自动重试
    #[error("{stage}失败: {message}")]
    ExternalService {
        stage: PipelineStage,
        message: String,
    },

    /// 请求在完成前被 reset 或更新的请求取代，结果已丢弃
    #[error("试戴请求已被取代")]
    Superseded,
}

/// 持久化错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    /// 远程存储不可用或拒绝写入
    #[error("远程存储写入失败: {0}")]
    Remote(String),

    /// 本地镜像写入失败
    #[error("本地镜像写入失败: {0}")]
    Local(String),

    /// 乐观写入时远程版本已变化
    #[error("远程记录版本冲突 (期望版本 {expected:?})")]
    Conflict { expected: Option<i64> },

    /// 记录无法序列化
    #[error("记录序列化失败: {0}")]
    Serialization(String),

    /// 更新补丁未通过校验
    #[error("输入校验失败: {0}")]
    Validation(String),
}

impl PersistenceError {
    /// 将底层错误压缩为一行可读信息（不带调用栈和传输层细节）
    pub fn remote(err: &anyhow::Error) -> Self {
        PersistenceError::Remote(err.to_string())
    }

    pub fn local(err: &anyhow::Error) -> Self {
        PersistenceError::Local(err.to_string())
    }
}
