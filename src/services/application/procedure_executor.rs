//! 流程执行器
//!
//! 按顺序解释已校验的流程步骤（读/写/条件/等待/轮询），
//! 驱动标签服务完成设备访问。条件步骤按名跳转，允许向后跳转，
//! 不缓存"已访问"步骤；终止性只由 wait/loop 的边界与外部取消保证。
//! 首个失败步骤使流程进入 FAILED，其余步骤不再执行；
//! 外部取消使流程进入 ABORTED。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use log::{error, info};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::procedure::{
    Condition, ExecutionResult, ExecutionStatus, ProcedureDefinition, ProcedureStep, StepAction,
    StepResult,
};
use crate::models::tag::{TagOpStatus, TagValue};
use crate::services::application::tag_service::TagService;
use crate::utils::error::{AppError, AppResult};

/// 流程执行器
pub struct ProcedureExecutor {
    tag_service: Arc<TagService>,
}

impl ProcedureExecutor {
    pub fn new(tag_service: Arc<TagService>) -> Self {
        Self { tag_service }
    }

    /// 执行一个完整流程
    pub async fn execute_procedure(&self, procedure: &ProcedureDefinition) -> ExecutionResult {
        self.execute_with_cancel(procedure, &CancellationToken::new())
            .await
    }

    /// 执行流程，支持外部取消（取消后状态为 ABORTED）
    pub async fn execute_with_cancel(
        &self,
        procedure: &ProcedureDefinition,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        info!("开始执行流程: {}", procedure.name);
        let start = Instant::now();

        let mut status = ExecutionStatus::Running;
        let mut error_message: Option<String> = None;
        let mut step_results: Vec<StepResult> = Vec::new();
        let mut variables: HashMap<String, TagValue> = HashMap::new();
        // 最近一次条件步骤未选中的分支头；顺序推进经过时跳过一次
        let mut skip_target: Option<String> = None;

        let mut index = 0usize;
        while index < procedure.steps.len() {
            let step = &procedure.steps[index];

            let step_result = tokio::select! {
                _ = cancel.cancelled() => {
                    status = ExecutionStatus::Aborted;
                    error_message = Some("执行被外部取消".to_string());
                    break;
                }
                result = self.execute_step(step, &mut variables) => result,
            };

            if step_result.status == TagOpStatus::Error {
                status = ExecutionStatus::Failed;
                error_message = step_result.error_message.clone();
                step_results.push(step_result);
                break;
            }

            // 条件步骤覆盖默认的顺序推进
            let next = match next_step_index(
                step,
                &step_result,
                &procedure.steps,
                index,
                &mut skip_target,
            ) {
                Ok(next) => next,
                Err(e) => {
                    error!("流程 {} 跳转失败: {}", procedure.name, e);
                    status = ExecutionStatus::Failed;
                    error_message = Some(e.to_string());
                    step_results.push(step_result);
                    break;
                }
            };

            step_results.push(step_result);

            match next {
                Some(next_index) => index = next_index,
                None => break,
            }
        }

        if status == ExecutionStatus::Running {
            status = ExecutionStatus::Completed;
        }

        let successful_steps = step_results
            .iter()
            .filter(|r| r.status == TagOpStatus::Success)
            .count();
        let failed_steps = step_results.len() - successful_steps;

        info!(
            "流程执行结束: {} - {} ({} 步, 成功 {}, 失败 {})",
            procedure.name,
            status.as_str(),
            step_results.len(),
            successful_steps,
            failed_steps
        );

        ExecutionResult {
            procedure_name: procedure.name.clone(),
            execution_id: Uuid::new_v4(),
            status,
            total_steps: step_results.len(),
            successful_steps,
            failed_steps,
            execution_time_ms: start.elapsed().as_millis() as u64,
            step_results,
            error_message,
        }
    }

    /// 执行单个步骤；步骤内部的错误转换为 error 状态的步骤记录
    async fn execute_step(
        &self,
        step: &ProcedureStep,
        variables: &mut HashMap<String, TagValue>,
    ) -> StepResult {
        let start = Instant::now();

        match &step.action {
            StepAction::Read {
                plc_id,
                register,
                store_as,
            } => {
                let result = self.tag_service.read_tag(plc_id, register).await;
                let elapsed = start.elapsed().as_millis() as u64;

                if result.status == TagOpStatus::Success {
                    let value = result.data.unwrap_or(TagValue::UInt(0));
                    if let Some(variable) = store_as {
                        variables.insert(variable.clone(), value.clone());
                    }
                    match serde_json::to_value(&value) {
                        Ok(data) => StepResult::success(step, data, elapsed),
                        Err(e) => StepResult::failure(step, e.to_string(), elapsed),
                    }
                } else {
                    StepResult::failure(
                        step,
                        result
                            .error_message
                            .unwrap_or_else(|| "读取失败".to_string()),
                        elapsed,
                    )
                }
            }

            StepAction::Write {
                plc_id,
                register,
                value,
            } => {
                let result = self.tag_service.write_tag(plc_id, register, value).await;
                let elapsed = start.elapsed().as_millis() as u64;

                if result.status == TagOpStatus::Success {
                    StepResult::success(step, value.clone(), elapsed)
                } else {
                    StepResult::failure(
                        step,
                        result
                            .error_message
                            .unwrap_or_else(|| "写入失败".to_string()),
                        elapsed,
                    )
                }
            }

            StepAction::Condition {
                plc_id, condition, ..
            } => match self.evaluate_condition(plc_id, condition).await {
                Ok(outcome) => StepResult::success(
                    step,
                    serde_json::Value::Bool(outcome),
                    start.elapsed().as_millis() as u64,
                ),
                Err(e) => {
                    StepResult::failure(step, e.to_string(), start.elapsed().as_millis() as u64)
                }
            },

            StepAction::Wait { seconds } => {
                sleep(Duration::from_secs_f64(*seconds)).await;
                match serde_json::to_value(seconds) {
                    Ok(data) => {
                        StepResult::success(step, data, start.elapsed().as_millis() as u64)
                    }
                    Err(e) => {
                        StepResult::failure(step, e.to_string(), start.elapsed().as_millis() as u64)
                    }
                }
            }

            StepAction::Loop {
                plc_id,
                condition,
                max_iterations,
                delay_seconds,
            } => {
                self.execute_loop(step, plc_id, condition, *max_iterations, *delay_seconds, start)
                    .await
            }
        }
    }

    /// 轮询步骤：首次为真即成功；最后一次迭代后不再等待
    async fn execute_loop(
        &self,
        step: &ProcedureStep,
        plc_id: &str,
        condition: &str,
        max_iterations: u32,
        delay_seconds: f64,
        start: Instant,
    ) -> StepResult {
        for iteration in 0..max_iterations {
            match self.evaluate_condition(plc_id, condition).await {
                Ok(true) => {
                    return StepResult::success(
                        step,
                        serde_json::Value::String(format!(
                            "条件在第 {} 次轮询后满足",
                            iteration + 1
                        )),
                        start.elapsed().as_millis() as u64,
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    return StepResult::failure(
                        step,
                        format!("轮询中读取失败: {}", e),
                        start.elapsed().as_millis() as u64,
                    );
                }
            }

            if iteration + 1 < max_iterations {
                sleep(Duration::from_secs_f64(delay_seconds)).await;
            }
        }

        StepResult::failure(
            step,
            format!("轮询 {} 次后条件仍未满足", max_iterations),
            start.elapsed().as_millis() as u64,
        )
    }

    /// 读取条件中的标签并求值
    async fn evaluate_condition(&self, plc_id: &str, condition: &str) -> AppResult<bool> {
        let parsed = Condition::parse(condition)?;
        let read = self.tag_service.read_tag(plc_id, &parsed.tag).await;

        if read.status != TagOpStatus::Success {
            return Err(AppError::unknown_error(format!(
                "读取条件寄存器失败: {}",
                read.error_message
                    .unwrap_or_else(|| "未知原因".to_string())
            )));
        }

        let value = read.data.unwrap_or(TagValue::UInt(0));
        parsed.evaluate(&value)
    }
}

/// 计算下一个步骤下标
///
/// 条件步骤按求值结果跳转到 if_true/if_false 指名的步骤
/// （允许指向自身或向后跳转，跳转目标不做"已访问"缓存）。
/// 未选中的分支头在随后的顺序推进经过时被跳过一次，
/// 因此 if/else 两个分支只会执行其一。其余步骤顺序推进，
/// 走出末尾即完成。
fn next_step_index(
    current: &ProcedureStep,
    step_result: &StepResult,
    steps: &[ProcedureStep],
    current_index: usize,
    skip_target: &mut Option<String>,
) -> AppResult<Option<usize>> {
    if let StepAction::Condition {
        if_true, if_false, ..
    } = &current.action
    {
        let outcome = matches!(step_result.data, Some(serde_json::Value::Bool(true)));
        let (target, other) = if outcome {
            (if_true, if_false)
        } else {
            (if_false, if_true)
        };
        *skip_target = if if_true != if_false {
            Some(other.clone())
        } else {
            None
        };

        return steps
            .iter()
            .position(|s| &s.name == target)
            .map(Some)
            .ok_or_else(|| {
                AppError::validation_error(format!("步骤 '{}' 不存在", target))
            });
    }

    let mut next = current_index + 1;
    if let Some(skip) = skip_target.as_deref() {
        if next < steps.len() && steps[next].name == skip {
            next += 1;
            *skip_target = None;
        }
    }
    Ok(if next < steps.len() { Some(next) } else { None })
}
