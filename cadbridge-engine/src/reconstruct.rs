//! 写回时由 `{axis, distance, entity1, entity2}` 反推线性标注的定义点。

use cadbridge_core::{
    drawing::{DEFAULT_DIMENSION_TEXT_HEIGHT, LinearDimension},
    geometry::Point3,
    interchange::{Axis, DimensionRecord, EndpointRef, Role},
};
use tracing::debug;

use crate::flatten::FlattenedPool;

pub struct DimensionReconstructor<'a> {
    pool: &'a FlattenedPool,
}

impl<'a> DimensionReconstructor<'a> {
    pub fn new(pool: &'a FlattenedPool) -> Self {
        Self { pool }
    }

    /// 按引用角色取线段上的点，引用不存在时返回 `None`。
    pub fn resolve(&self, reference: &EndpointRef) -> Option<Point3> {
        let line = self.pool.entities.line.get(&reference.id)?;
        Some(match reference.location {
            Role::Start => line.start,
            Role::End => line.end,
            Role::Center => line.midpoint(),
        })
    }

    /// 引用缺失、无法解析或没有方向信息时跳过该标注。
    pub fn reconstruct(&self, dimension: &DimensionRecord) -> Option<LinearDimension> {
        let (Some(first), Some(second)) = (
            dimension.entity1.as_ref().and_then(|reference| self.resolve(reference)),
            dimension.entity2.as_ref().and_then(|reference| self.resolve(reference)),
        ) else {
            debug!(dimension = %dimension.id, "标注引用缺失或无法解析，跳过");
            return None;
        };
        let (Some(axis), Some(distance)) = (dimension.axis, dimension.distance) else {
            debug!(dimension = %dimension.id, "标注缺少方向或偏移量，跳过");
            return None;
        };

        let (base, rotation) = match axis {
            Axis::Y => {
                let y = first.y().max(second.y()) + distance;
                (Point3::new(first.x(), y, first.z()), 0.0)
            }
            Axis::X => {
                let x = first.x().max(second.x()) + distance;
                (Point3::new(x, first.y(), first.z()), 90.0)
            }
        };
        let font_size = if dimension.font_size > 0.0 {
            dimension.font_size
        } else {
            DEFAULT_DIMENSION_TEXT_HEIGHT
        };

        Some(LinearDimension {
            base,
            first_point: first,
            second_point: second,
            rotation,
            text: dimension.display_text(),
            style: dimension.dimstyle.clone(),
            font_size,
            layer: dimension.layer.clone(),
            color: dimension.color,
        })
    }
}
