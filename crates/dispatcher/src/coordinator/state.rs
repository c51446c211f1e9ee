//! 单个工作流实例的调度状态
//!
//! 只维护内存中的集合，不做任何IO：哪些节点已完成、正在运行、等待提交、
//! 因上游失败无法运行、被分支跳过或被禁用放行。

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use scheduler_core::models::{
    Direct, ExecutionStatus, ProcessInstance, Property, TaskInstance, TaskNode, DEFAULT_WORKER_GROUP,
};
use scheduler_core::Dag;

use crate::processors::FlowDirective;

/// 节点前驱的满足情况
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PredStatus {
    Satisfied,
    Waiting,
    Failed,
    Skipped,
}

pub struct DagRunState {
    pub dag: Dag,
    /// 已结束的任务，按节点名
    pub complete: HashMap<String, TaskInstance>,
    /// 已提交、等待结果的任务
    pub active: HashMap<String, TaskInstance>,
    /// 已就绪、等待提交的任务（包括等待重试的任务）
    pub standby: Vec<TaskInstance>,
    /// 最终失败且未被条件任务接管的任务
    pub errors: HashMap<String, TaskInstance>,
    pub depend_failed: HashSet<String>,
    pub skipped: HashSet<String>,
    pub forbidden_passed: HashSet<String>,
    /// 本轮需要告警的容错任务
    pub tolerance_faults: Vec<TaskInstance>,
    /// 恢复运行时库中已有的有效任务
    preloaded: HashMap<String, TaskInstance>,
    /// 已被阻断任务暂停
    pub blocked: bool,
    /// 有任务提交失败
    pub task_failed_submit: bool,
}

impl DagRunState {
    pub fn new(dag: Dag) -> Self {
        Self {
            dag,
            complete: HashMap::new(),
            active: HashMap::new(),
            standby: Vec::new(),
            errors: HashMap::new(),
            depend_failed: HashSet::new(),
            skipped: HashSet::new(),
            forbidden_passed: HashSet::new(),
            tolerance_faults: Vec::new(),
            preloaded: HashMap::new(),
            blocked: false,
            task_failed_submit: false,
        }
    }

    /// 载入库中已有的有效任务
    ///
    /// 已完成的任务直接计入完成集合，不可重试的失败任务同时计入失败集合，
    /// 其余任务在节点就绪时复用。
    pub fn preload(&mut self, tasks: Vec<TaskInstance>) {
        for task in tasks {
            if !self.dag.contains(&task.name) {
                continue;
            }
            if task.is_complete() {
                if task.state.is_failure()
                    && !task.is_conditions()
                    && !self.has_conditions_after(&task.name)
                {
                    self.errors.insert(task.name.clone(), task.clone());
                }
                self.complete.insert(task.name.clone(), task);
            } else {
                self.preloaded.insert(task.name.clone(), task);
            }
        }
    }

    /// 按流向指令更新跳过集合，阻断指令由调用方处理
    pub fn apply_directive(&mut self, directive: &FlowDirective) {
        if let FlowDirective::Route { skip } = directive {
            for name in skip {
                if self.dag.contains(name) && !self.complete.contains_key(name) {
                    self.skipped.insert(name.clone());
                }
            }
        }
    }

    fn is_settled(&self, name: &str) -> bool {
        self.complete.contains_key(name)
            || self.active.contains_key(name)
            || self.standby.iter().any(|t| t.name == name)
            || self.depend_failed.contains(name)
            || self.skipped.contains(name)
            || self.forbidden_passed.contains(name)
    }

    fn pred_status(&self, node: &TaskNode) -> PredStatus {
        let preds = self.dag.predecessors(&node.name);
        if !preds.is_empty() && preds.iter().all(|p| self.skipped.contains(&p.name)) {
            return PredStatus::Skipped;
        }

        let mut status = PredStatus::Satisfied;
        for pred in preds {
            let name = pred.name.as_str();
            if self.skipped.contains(name) || self.forbidden_passed.contains(name) {
                continue;
            }
            if self.depend_failed.contains(name) {
                return PredStatus::Failed;
            }
            match self.complete.get(name) {
                Some(task) if task.state.is_success() => {}
                Some(task) if task.state.is_failure() => {
                    // 条件任务根据前驱的结果选择分支，前驱失败不影响其运行
                    if !node.is_conditions() {
                        return PredStatus::Failed;
                    }
                }
                _ => status = PredStatus::Waiting,
            }
        }
        status
    }

    /// 计算新就绪的节点
    ///
    /// 按拓扑序处理，同一轮内被跳过或禁用放行的节点对后继立即生效。
    pub fn resolve_ready(&mut self) -> Vec<TaskNode> {
        let mut ready = Vec::new();
        let nodes: Vec<TaskNode> = self.dag.nodes_in_order().cloned().collect();
        for node in nodes {
            if self.is_settled(&node.name) || ready.iter().any(|n: &TaskNode| n.name == node.name) {
                continue;
            }
            match self.pred_status(&node) {
                PredStatus::Waiting => {}
                PredStatus::Skipped => {
                    self.skipped.insert(node.name.clone());
                }
                PredStatus::Failed => {
                    self.depend_failed.insert(node.name.clone());
                }
                PredStatus::Satisfied if node.is_forbidden() => {
                    self.forbidden_passed.insert(node.name.clone());
                }
                PredStatus::Satisfied => ready.push(node),
            }
        }
        ready
    }

    /// 为就绪节点准备任务实例
    ///
    /// 恢复运行时复用库中的任务；新任务继承实例的Worker分组（节点未指定分组时），
    /// 变量池取自前驱任务的输出参数。
    pub fn task_for_node(&mut self, node: &TaskNode, instance: &ProcessInstance) -> TaskInstance {
        if let Some(task) = self.preloaded.remove(&node.name) {
            return task;
        }
        let mut task = TaskInstance::from_node(node, instance.process_definition_id, instance.id);
        let node_group = task.worker_group.trim();
        if (node_group.is_empty() || node_group == DEFAULT_WORKER_GROUP)
            && instance.worker_group != DEFAULT_WORKER_GROUP
            && !instance.worker_group.trim().is_empty()
        {
            task.worker_group = instance.worker_group.clone();
        }
        task.var_pool = self.predecessor_outputs(&node.name);
        task
    }

    fn predecessor_outputs(&self, name: &str) -> Vec<Property> {
        let mut outputs: Vec<Property> = Vec::new();
        for pred in self.dag.predecessors(name) {
            if let Some(task) = self.complete.get(&pred.name) {
                for property in task.var_pool.iter().filter(|p| p.direct == Direct::Out) {
                    outputs.retain(|p| p.prop != property.prop);
                    outputs.push(property.clone());
                }
            }
        }
        outputs
    }

    /// 取出可以提交的任务，按任务优先级排序，重试任务需等待重试间隔
    pub fn take_submittable(&mut self, limit: usize, now: DateTime<Utc>) -> Vec<TaskInstance> {
        self.standby
            .sort_by_key(|t| t.task_instance_priority.ordinal());
        let mut taken = Vec::new();
        let mut remaining = Vec::with_capacity(self.standby.len());
        for task in self.standby.drain(..) {
            if taken.len() < limit && task.retry_interval_elapsed(now) {
                taken.push(task);
            } else {
                remaining.push(task);
            }
        }
        self.standby = remaining;
        taken
    }

    /// 失败节点之后是否存在条件任务
    pub fn has_conditions_after(&self, name: &str) -> bool {
        self.dag.successors(name).iter().any(|n| n.is_conditions())
    }

    pub fn has_retry_in_standby(&self) -> bool {
        self.standby.iter().any(|t| t.state.is_failure())
    }

    pub fn complete_in_states(&self, states: &[ExecutionStatus]) -> Vec<&TaskInstance> {
        self.complete
            .values()
            .filter(|t| states.contains(&t.state))
            .collect()
    }

    /// 出现失败任务后，暂停的任务改记为被杀死，返回被修改的任务
    pub fn convert_paused_to_killed(&mut self) -> Vec<TaskInstance> {
        if self.errors.is_empty() {
            return Vec::new();
        }
        let mut changed = Vec::new();
        for task in self.complete.values_mut() {
            if task.state == ExecutionStatus::Pause {
                task.state = ExecutionStatus::Kill;
                changed.push(task.clone());
            }
        }
        changed
    }

    /// 实例是否因失败任务而失败
    pub fn process_failed(&self, end_on_failure: bool) -> bool {
        if self.task_failed_submit {
            return true;
        }
        if self.errors.is_empty() {
            return false;
        }
        end_on_failure || (self.standby.is_empty() && self.active.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::models::{ProcessDefinition, RunFlag};

    fn node(name: &str, pre: &[&str]) -> TaskNode {
        let mut node = TaskNode::new(name, "SHELL");
        node.pre_tasks = pre.iter().map(|s| s.to_string()).collect();
        node
    }

    fn instance() -> ProcessInstance {
        let definition = ProcessDefinition {
            id: 1,
            name: "flow".to_string(),
            version: 1,
            process_definition_json: String::new(),
            timeout: 0,
            tenant_id: 0,
            receivers: Vec::new(),
            receivers_cc: Vec::new(),
            update_time: Utc::now(),
        };
        let mut instance = ProcessInstance::from_definition(&definition);
        instance.id = 7;
        instance
    }

    fn finished(node: &TaskNode, state: ExecutionStatus) -> TaskInstance {
        let mut task = TaskInstance::from_node(node, 1, 7);
        task.state = state;
        task
    }

    fn names(nodes: &[TaskNode]) -> Vec<String> {
        let mut names: Vec<String> = nodes.iter().map(|n| n.name.clone()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_ready_after_predecessors_succeed() {
        let a = node("a", &[]);
        let b = node("b", &["a"]);
        let c = node("c", &["a"]);
        let mut state = DagRunState::new(Dag::build(vec![a.clone(), b, c]).unwrap());

        assert_eq!(names(&state.resolve_ready()), vec!["a"]);
        state.complete.insert("a".to_string(), finished(&a, ExecutionStatus::Success));
        assert_eq!(names(&state.resolve_ready()), vec!["b", "c"]);
    }

    #[test]
    fn test_failed_predecessor_prunes_descendants() {
        let a = node("a", &[]);
        let mut state = DagRunState::new(
            Dag::build(vec![a.clone(), node("b", &["a"]), node("c", &["b"])]).unwrap(),
        );
        state.complete.insert("a".to_string(), finished(&a, ExecutionStatus::Failure));

        assert!(state.resolve_ready().is_empty());
        assert!(state.depend_failed.contains("b"));
        assert!(state.depend_failed.contains("c"));
    }

    #[test]
    fn test_forbidden_node_is_passed_through() {
        let mut b = node("b", &["a"]);
        b.run_flag = RunFlag::Forbidden;
        let a = node("a", &[]);
        let mut state =
            DagRunState::new(Dag::build(vec![a.clone(), b, node("c", &["b"])]).unwrap());
        state.complete.insert("a".to_string(), finished(&a, ExecutionStatus::Success));

        assert_eq!(names(&state.resolve_ready()), vec!["c"]);
        assert!(state.forbidden_passed.contains("b"));
    }

    #[test]
    fn test_skip_propagates_only_when_all_predecessors_skipped() {
        let cond = node("cond", &[]);
        let mut state = DagRunState::new(
            Dag::build(vec![
                cond.clone(),
                node("ok", &["cond"]),
                node("fix", &["cond"]),
                node("after_fix", &["fix"]),
                node("join", &["ok", "fix"]),
            ])
            .unwrap(),
        );
        state.complete.insert("cond".to_string(), finished(&cond, ExecutionStatus::Success));
        state.apply_directive(&FlowDirective::Route { skip: vec!["fix".to_string()] });

        assert_eq!(names(&state.resolve_ready()), vec!["ok"]);
        assert!(state.skipped.contains("after_fix"));
        assert!(!state.skipped.contains("join"));
    }

    #[test]
    fn test_new_task_inherits_instance_worker_group_and_outputs() {
        let mut a = node("a", &[]);
        a.worker_group = Some("etl".to_string());
        let b = node("b", &["a"]);
        let mut state = DagRunState::new(Dag::build(vec![a.clone(), b.clone()]).unwrap());
        let mut done = finished(&a, ExecutionStatus::Success);
        done.var_pool = vec![Property::output("rows", "42"), Property::new("ignored", "x")];
        state.complete.insert("a".to_string(), done);

        let mut inst = instance();
        inst.worker_group = "gpu".to_string();
        let task = state.task_for_node(&b, &inst);
        assert_eq!(task.worker_group, "gpu");
        assert_eq!(task.var_pool, vec![Property::output("rows", "42")]);

        let fresh = DagRunState::new(Dag::build(vec![a.clone()]).unwrap()).task_for_node(&a, &inst);
        assert_eq!(fresh.worker_group, "etl");
    }

    #[test]
    fn test_preload_reuses_unfinished_tasks() {
        let a = node("a", &[]);
        let b = node("b", &["a"]);
        let mut state = DagRunState::new(Dag::build(vec![a.clone(), b.clone()]).unwrap());
        let mut pending = finished(&b, ExecutionStatus::SubmittedSuccess);
        pending.id = 99;
        state.preload(vec![finished(&a, ExecutionStatus::Success), pending]);

        assert_eq!(names(&state.resolve_ready()), vec!["b"]);
        assert_eq!(state.task_for_node(&b, &instance()).id, 99);
    }

    #[test]
    fn test_retry_waits_for_interval() {
        let a = node("a", &[]);
        let mut state = DagRunState::new(Dag::build(vec![a.clone()]).unwrap());
        let now = Utc::now();
        let mut retry = finished(&a, ExecutionStatus::Failure);
        retry.max_retry_times = 3;
        retry.retry_interval = 5;
        retry.end_time = Some(now);
        state.standby.push(retry);

        assert!(state.take_submittable(10, now).is_empty());
        assert!(state.has_retry_in_standby());
        assert_eq!(state.take_submittable(10, now + chrono::Duration::minutes(6)).len(), 1);
    }
}
