use std::fmt;

use crate::errors::DomainError;
use crate::value_objects::{RoomName, UserId};

/// 全局房间在协议层使用的名字。
pub const GLOBAL_ROOM: &str = "global";

/// 一次投递的逻辑范围：全局房间、命名房间或私聊对。
///
/// 标识的是逻辑投递域而非物理资源。私聊对是无序的，
/// 构造时按用户 ID 排序归一化，保证 `Hash`/`Eq` 一致。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomTarget {
    Global,
    Named(RoomName),
    Private { a: UserId, b: UserId },
}

impl RoomTarget {
    /// 构造归一化的私聊目标。
    pub fn private(x: UserId, y: UserId) -> Self {
        if x <= y {
            Self::Private { a: x, b: y }
        } else {
            Self::Private { a: y, b: x }
        }
    }

    /// 从协议层的房间字段解析目标；缺省为全局房间。
    pub fn from_wire(room: Option<&str>) -> Result<Self, DomainError> {
        match room {
            None => Ok(Self::Global),
            Some(name) if name == GLOBAL_ROOM => Ok(Self::Global),
            Some(name) => Ok(Self::Named(RoomName::new(name)?)),
        }
    }

    /// 房间范围在协议层的名字；私聊目标没有房间名。
    pub fn wire_room(&self) -> Option<&str> {
        match self {
            Self::Global => Some(GLOBAL_ROOM),
            Self::Named(name) => Some(name.as_str()),
            Self::Private { .. } => None,
        }
    }

    /// 私聊对中发送者的对端；自聊时对端即本人。
    pub fn private_peer(&self, sender: UserId) -> Option<UserId> {
        match self {
            Self::Private { a, b } if *a == sender => Some(*b),
            Self::Private { a, b } if *b == sender => Some(*a),
            _ => None,
        }
    }
}

impl fmt::Display for RoomTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Named(name) => write!(f, "room:{name}"),
            Self::Private { a, b } => write!(f, "private:{a}:{b}"),
        }
    }
}
