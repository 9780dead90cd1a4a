//! 医嘱状态机
//!
//! 管理检验医嘱的完整生命周期状态转换

use lis_core::{LisError, OrderStatus, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 医嘱状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderEvent {
    Start,
    Complete,
    Cancel,
}

impl OrderEvent {
    /// 事件对应的目标状态
    pub fn target(&self) -> OrderStatus {
        match self {
            OrderEvent::Start => OrderStatus::InProgress,
            OrderEvent::Complete => OrderStatus::Completed,
            OrderEvent::Cancel => OrderStatus::Cancelled,
        }
    }

    /// 目标状态对应的事件
    ///
    /// pending 不是任何事件的目标状态，返回 None。
    pub fn for_target(status: OrderStatus) -> Option<OrderEvent> {
        match status {
            OrderStatus::InProgress => Some(OrderEvent::Start),
            OrderStatus::Completed => Some(OrderEvent::Complete),
            OrderStatus::Cancelled => Some(OrderEvent::Cancel),
            OrderStatus::Pending => None,
        }
    }
}

/// 医嘱状态机
///
/// completed 与 cancelled 为终止状态，没有出边。
#[derive(Debug)]
pub struct OrderStateMachine {
    transitions: HashMap<(OrderStatus, OrderEvent), OrderStatus>,
}

impl OrderStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 定义状态转换规则
        transitions.insert((OrderStatus::Pending, OrderEvent::Start), OrderStatus::InProgress);
        transitions.insert((OrderStatus::InProgress, OrderEvent::Complete), OrderStatus::Completed);
        transitions.insert((OrderStatus::Pending, OrderEvent::Cancel), OrderStatus::Cancelled);
        transitions.insert((OrderStatus::InProgress, OrderEvent::Cancel), OrderStatus::Cancelled);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: OrderStatus, event: OrderEvent) -> bool {
        self.transitions.contains_key(&(from, event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: OrderStatus, event: OrderEvent) -> Result<OrderStatus> {
        match self.transitions.get(&(from, event)) {
            Some(to) => Ok(*to),
            None => Err(LisError::InvalidStateTransition {
                from: from.to_string(),
                to: event.target().to_string(),
            }),
        }
    }

    /// 获取所有可能的状态
    pub fn all_states() -> Vec<OrderStatus> {
        vec![
            OrderStatus::Pending,
            OrderStatus::InProgress,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ]
    }

    /// 获取状态的所有可能事件
    pub fn possible_events(&self, current: OrderStatus) -> Vec<OrderEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for OrderStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let sm = OrderStateMachine::new();

        assert!(sm.can_transition(OrderStatus::Pending, OrderEvent::Start));
        assert!(sm.can_transition(OrderStatus::Pending, OrderEvent::Cancel));
        assert!(sm.can_transition(OrderStatus::InProgress, OrderEvent::Complete));
        assert!(sm.can_transition(OrderStatus::InProgress, OrderEvent::Cancel));
    }

    #[test]
    fn test_invalid_transitions() {
        let sm = OrderStateMachine::new();

        // pending 不能直接完成
        assert!(!sm.can_transition(OrderStatus::Pending, OrderEvent::Complete));
        assert!(!sm.can_transition(OrderStatus::Completed, OrderEvent::Start));
        assert!(!sm.can_transition(OrderStatus::Cancelled, OrderEvent::Start));
    }

    #[test]
    fn test_terminal_states_have_no_events() {
        let sm = OrderStateMachine::new();

        assert!(sm.possible_events(OrderStatus::Completed).is_empty());
        assert!(sm.possible_events(OrderStatus::Cancelled).is_empty());
    }

    #[test]
    fn test_transition_execution() {
        let sm = OrderStateMachine::new();

        let result = sm.transition(OrderStatus::Pending, OrderEvent::Start);
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), OrderStatus::InProgress);

        let result = sm.transition(OrderStatus::Pending, OrderEvent::Complete);
        assert!(matches!(
            result,
            Err(LisError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_event_target_mapping() {
        assert_eq!(OrderEvent::for_target(OrderStatus::InProgress), Some(OrderEvent::Start));
        assert_eq!(OrderEvent::for_target(OrderStatus::Completed), Some(OrderEvent::Complete));
        assert_eq!(OrderEvent::for_target(OrderStatus::Cancelled), Some(OrderEvent::Cancel));
        assert_eq!(OrderEvent::for_target(OrderStatus::Pending), None);
    }
}
