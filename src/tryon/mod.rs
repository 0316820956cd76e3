// 试戴模块 - 客户端的两阶段试戴流程

pub mod controller;

pub use controller::{StyleSelection, TryOnController, TryOnOutcome, TryOnState};
