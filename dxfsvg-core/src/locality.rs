//! 双端元素（直线、圆弧、多段线）的端点邻近判断，用于把首尾相接的图元归为一组。

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::geometry::Point;

/// 具有起点与终点的元素。单点元素的终点可以缺失。
pub trait DoubleEnded {
    fn start_point(&self) -> Option<Point>;

    fn end_point(&self) -> Option<Point>;

    /// 按顺序返回所有段端点，起点在前。
    fn segment_points(&self) -> Vec<Point> {
        self.start_point()
            .into_iter()
            .chain(self.end_point())
            .collect()
    }
}

/// 命中的端点组合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointPair {
    StartStart,
    StartEnd,
    EndStart,
    EndEnd,
}

/// 查找两个元素第一个重合的端点组合。起点-起点最先比较；
/// 缺失端点的组合被跳过，不影响其余组合。
pub fn shared_endpoint<A, B>(a: &A, b: &B) -> Option<EndpointPair>
where
    A: DoubleEnded + ?Sized,
    B: DoubleEnded + ?Sized,
{
    let a_start = a.start_point();
    let a_end = a.end_point();
    let b_start = b.start_point();
    let b_end = b.end_point();

    let candidates = [
        (EndpointPair::StartStart, a_start, b_start),
        (EndpointPair::StartEnd, a_start, b_end),
        (EndpointPair::EndStart, a_end, b_start),
        (EndpointPair::EndEnd, a_end, b_end),
    ];
    for (pair, left, right) in candidates {
        match (left, right) {
            (Some(left), Some(right)) => {
                if left.is_same_place(&right) {
                    return Some(pair);
                }
            }
            _ => trace!(?pair, "端点缺失，跳过该组合"),
        }
    }
    None
}

#[inline]
pub fn share_endpoint<A, B>(a: &A, b: &B) -> bool
where
    A: DoubleEnded + ?Sized,
    B: DoubleEnded + ?Sized,
{
    shared_endpoint(a, b).is_some()
}
