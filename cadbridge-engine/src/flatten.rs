use cadbridge_core::interchange::{CadData, EntityBuckets, LayerRecord};
use indexmap::IndexMap;

/// 整棵组合图的图层与实体汇总，供写回时跨子图解析引用。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedPool {
    pub layers: IndexMap<String, LayerRecord>,
    pub entities: EntityBuckets,
}

/// 深度优先遍历：自身、partners、components.data，同 id 先到先得。
pub fn flatten(root: &CadData) -> FlattenedPool {
    let mut pool = FlattenedPool::default();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        for (id, layer) in &node.layers {
            pool.layers
                .entry(id.clone())
                .or_insert_with(|| layer.clone());
        }
        pool.entities.absorb(&node.entities);
        // 逆序压栈以保持先 partners 后 components 的访问顺序
        for child in node.components.data.iter().rev() {
            stack.push(child);
        }
        for partner in node.partners.iter().rev() {
            stack.push(partner);
        }
    }
    pool
}
