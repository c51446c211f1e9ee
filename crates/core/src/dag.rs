//! 工作流依赖图
//!
//! 节点按下标存放在数组中，前驱/后继以下标列表表示，名称到下标的映射提供O(1)查找。
//! 构建时使用Kahn算法拒绝环。

use std::collections::{HashMap, HashSet, VecDeque};

use crate::models::{TaskDependType, TaskNode};
use crate::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone)]
pub struct Dag {
    nodes: Vec<TaskNode>,
    index: HashMap<String, usize>,
    preds: Vec<Vec<usize>>,
    succs: Vec<Vec<usize>>,
    topo_order: Vec<usize>,
}

impl Dag {
    /// 由任务节点列表构建依赖图
    ///
    /// 重名节点或引用不存在的前置节点视为无效定义；存在环时返回 `CircularDependency`。
    pub fn build(nodes: Vec<TaskNode>) -> SchedulerResult<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.name.clone(), i).is_some() {
                return Err(SchedulerError::InvalidTaskParams(format!(
                    "任务节点名称重复: {}",
                    node.name
                )));
            }
        }

        let mut preds = vec![Vec::new(); nodes.len()];
        let mut succs = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for pre in &node.pre_tasks {
                let &p = index.get(pre).ok_or_else(|| {
                    SchedulerError::InvalidTaskParams(format!(
                        "任务 {} 的前置任务 {} 不存在",
                        node.name, pre
                    ))
                })?;
                if !preds[i].contains(&p) {
                    preds[i].push(p);
                    succs[p].push(i);
                }
            }
        }

        let topo_order = Self::topological_sort(&preds, &succs).ok_or_else(|| {
            SchedulerError::CircularDependency(
                nodes
                    .iter()
                    .map(|n| n.name.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            )
        })?;

        Ok(Self {
            nodes,
            index,
            preds,
            succs,
            topo_order,
        })
    }

    fn topological_sort(preds: &[Vec<usize>], succs: &[Vec<usize>]) -> Option<Vec<usize>> {
        let mut in_degree: Vec<usize> = preds.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(preds.len());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &next in &succs[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        (order.len() == preds.len()).then_some(order)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&TaskNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// 按拓扑序返回节点
    pub fn nodes_in_order(&self) -> impl Iterator<Item = &TaskNode> {
        self.topo_order.iter().map(move |&i| &self.nodes[i])
    }

    pub fn predecessors(&self, name: &str) -> Vec<&TaskNode> {
        self.index
            .get(name)
            .map(|&i| self.preds[i].iter().map(|&p| &self.nodes[p]).collect())
            .unwrap_or_default()
    }

    pub fn successors(&self, name: &str) -> Vec<&TaskNode> {
        self.index
            .get(name)
            .map(|&i| self.succs[i].iter().map(|&s| &self.nodes[s]).collect())
            .unwrap_or_default()
    }

    /// 没有前驱的起始节点
    pub fn begin_nodes(&self) -> Vec<&TaskNode> {
        self.topo_order
            .iter()
            .filter(|&&i| self.preds[i].is_empty())
            .map(|&i| &self.nodes[i])
            .collect()
    }

    /// 所有前驱都在完成集合中（或没有前驱）时节点就绪
    pub fn is_ready(&self, name: &str, completed: &HashSet<String>) -> bool {
        match self.index.get(name) {
            Some(&i) => self.preds[i]
                .iter()
                .all(|&p| completed.contains(&self.nodes[p].name)),
            None => false,
        }
    }

    /// 传递闭包上的所有祖先节点
    pub fn ancestors(&self, name: &str) -> HashSet<String> {
        self.closure(name, &self.preds)
    }

    /// 传递闭包上的所有后代节点
    pub fn descendants(&self, name: &str) -> HashSet<String> {
        self.closure(name, &self.succs)
    }

    fn closure(&self, name: &str, edges: &[Vec<usize>]) -> HashSet<String> {
        let mut visited = HashSet::new();
        let Some(&start) = self.index.get(name) else {
            return visited;
        };
        let mut queue: VecDeque<usize> = edges[start].iter().copied().collect();
        while let Some(i) = queue.pop_front() {
            if visited.insert(self.nodes[i].name.clone()) {
                queue.extend(edges[i].iter().copied());
            }
        }
        visited
    }

    /// 按启动节点和依赖范围裁剪出子图
    ///
    /// 子图之外的前置节点被视为已满足；启动节点为空时返回完整的图。
    pub fn partial(&self, start_nodes: &[String], depend_type: TaskDependType) -> SchedulerResult<Dag> {
        if start_nodes.is_empty() {
            return Ok(self.clone());
        }

        let mut keep: HashSet<String> = HashSet::new();
        for name in start_nodes {
            if !self.contains(name) {
                return Err(SchedulerError::InvalidCommandParam(format!(
                    "启动节点不存在: {name}"
                )));
            }
            keep.insert(name.clone());
            match depend_type {
                TaskDependType::TaskOnly => {}
                TaskDependType::TaskPre => keep.extend(self.ancestors(name)),
                TaskDependType::TaskPost => keep.extend(self.descendants(name)),
            }
        }

        let nodes = self
            .topo_order
            .iter()
            .map(|&i| &self.nodes[i])
            .filter(|n| keep.contains(&n.name))
            .map(|n| {
                let mut node = n.clone();
                node.pre_tasks.retain(|p| keep.contains(p));
                node
            })
            .collect();
        Dag::build(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, pre: &[&str]) -> TaskNode {
        let mut node = TaskNode::new(name, "SHELL");
        node.pre_tasks = pre.iter().map(|s| s.to_string()).collect();
        node
    }

    /// a -> b -> d, a -> c -> d
    fn diamond() -> Dag {
        Dag::build(vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["a"]),
            node("d", &["b", "c"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_predecessors_and_successors() {
        let dag = diamond();
        let succ: Vec<&str> = dag.successors("a").iter().map(|n| n.name.as_str()).collect();
        assert_eq!(succ, vec!["b", "c"]);
        assert_eq!(dag.predecessors("d").len(), 2);
        assert_eq!(dag.begin_nodes().len(), 1);
    }

    #[test]
    fn test_is_ready() {
        let dag = diamond();
        let mut completed = HashSet::new();
        assert!(dag.is_ready("a", &completed));
        assert!(!dag.is_ready("b", &completed));
        completed.insert("a".to_string());
        completed.insert("b".to_string());
        assert!(!dag.is_ready("d", &completed));
        completed.insert("c".to_string());
        assert!(dag.is_ready("d", &completed));
    }

    #[test]
    fn test_cycle_rejected() {
        let result = Dag::build(vec![node("a", &["c"]), node("b", &["a"]), node("c", &["b"])]);
        assert!(matches!(result, Err(SchedulerError::CircularDependency(_))));
    }

    #[test]
    fn test_unknown_pre_task_rejected() {
        let result = Dag::build(vec![node("a", &["missing"])]);
        assert!(matches!(result, Err(SchedulerError::InvalidTaskParams(_))));
    }

    #[test]
    fn test_topological_order() {
        let dag = diamond();
        let order: Vec<&str> = dag.nodes_in_order().map(|n| n.name.as_str()).collect();
        assert_eq!(order.first(), Some(&"a"));
        assert_eq!(order.last(), Some(&"d"));
    }

    #[test]
    fn test_partial_task_post() {
        let dag = diamond();
        let sub = dag.partial(&["b".to_string()], TaskDependType::TaskPost).unwrap();
        assert_eq!(sub.len(), 2);
        assert!(sub.contains("d"));
        // c 不在子图中，d 只等待 b
        assert_eq!(sub.predecessors("d").len(), 1);
        assert!(sub.predecessors("b").is_empty());
    }

    #[test]
    fn test_partial_task_pre_and_only() {
        let dag = diamond();
        let pre = dag.partial(&["b".to_string()], TaskDependType::TaskPre).unwrap();
        assert!(pre.contains("a"));
        assert!(!pre.contains("d"));
        let only = dag.partial(&["d".to_string()], TaskDependType::TaskOnly).unwrap();
        assert_eq!(only.len(), 1);
        assert!(only.begin_nodes().iter().any(|n| n.name == "d"));
    }

    #[test]
    fn test_partial_unknown_start_node() {
        let dag = diamond();
        assert!(dag.partial(&["x".to_string()], TaskDependType::TaskPost).is_err());
    }
}
