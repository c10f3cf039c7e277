// 该文件是 Shanan-SSD （山南西风） 项目的一部分。
// src/task.rs - 推理任务
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  fmt::Display,
  panic::{self, AssertUnwindSafe},
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc,
  },
  thread,
  time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 注册 Ctrl-C 处理，返回中断信号接收端
fn install_interrupt() -> anyhow::Result<mpsc::Receiver<()>> {
  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(rx)
}

pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

pub struct RepeatShotTask {
  times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { times: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_times(mut self, times: usize) -> Self {
    self.times = times.max(1);
    self
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.times);
    for i in 0..self.times {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      debug!("({})推理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &result)?;
      debug!("({})渲染完成，耗时: {:.2?}", i, now.elapsed());
      times.push(elapsed);
    }

    // 前两次视为预热
    let warm = if times.len() > 2 { &times[2..] } else { &times[..] };
    warn!(
      "平均推理时间: {:.2?}",
      warm.iter().sum::<Duration>() / warm.len() as u32
    );

    Ok(())
  }
}

/// 逐帧同步处理，直到输入耗尽、达到帧数或收到中断
#[derive(Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  handle_interrupt: bool,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      frame_number: None,
      handle_interrupt: true,
    }
  }
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_interrupt(mut self, handle_interrupt: bool) -> Self {
    self.handle_interrupt = handle_interrupt;
    self
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let interrupt = if self.handle_interrupt {
      Some(install_interrupt()?)
    } else {
      None
    };

    let mut frame_index = 0usize;
    let mut now = Instant::now();
    for frame in input {
      frame_index = frame_index.wrapping_add(1);
      debug!("处理第 {} 帧图像", frame_index);
      let result = model.infer(&frame)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result)?;
      let elapsed_b = now.elapsed();
      now = Instant::now();
      info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if interrupt.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，退出");
    Ok(())
  }
}

/// 提交帧的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
  Accepted,
  /// 上一帧仍在处理，本帧被丢弃
  Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerStats {
  pub processed: u64,
  pub dropped: u64,
  pub failed: u64,
}

#[derive(Default)]
struct WorkerState {
  busy: AtomicBool,
  processed: AtomicU64,
  dropped: AtomicU64,
  failed: AtomicU64,
}

/// 单个后台线程处理帧，同一时刻最多一帧在处理，忙时新帧直接丢弃而不排队
pub struct FrameWorker<F> {
  sender: Option<mpsc::Sender<F>>,
  handle: Option<thread::JoinHandle<()>>,
  state: Arc<WorkerState>,
}

impl<F: Send + 'static> FrameWorker<F> {
  pub fn spawn<D, M, O>(model: M, output: O) -> std::io::Result<Self>
  where
    M: Model<Input = F, Output = D> + Send + 'static,
    M::Error: Display,
    O: Render<F, D> + Send + 'static,
    O::Error: Display,
  {
    let (sender, receiver) = mpsc::channel::<F>();
    let state = Arc::new(WorkerState::default());
    let worker_state = state.clone();

    let handle = thread::Builder::new()
      .name("frame-worker".to_string())
      .spawn(move || {
        for frame in receiver {
          // 单帧 panic 计为失败，线程继续处理后续帧
          let outcome = panic::catch_unwind(AssertUnwindSafe(|| match model.infer(&frame) {
            Ok(result) => output
              .render_result(&frame, &result)
              .map_err(|e| format!("渲染失败: {}", e)),
            Err(e) => Err(format!("推理失败: {}", e)),
          }))
          .unwrap_or_else(|_| Err("处理帧时发生 panic".to_string()));
          match outcome {
            Ok(()) => {
              worker_state.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
              error!("{}", e);
              worker_state.failed.fetch_add(1, Ordering::Relaxed);
            }
          }
          worker_state.busy.store(false, Ordering::Release);
        }
        debug!("帧处理线程退出");
      })?;

    Ok(Self {
      sender: Some(sender),
      handle: Some(handle),
      state,
    })
  }

  pub fn submit(&self, frame: F) -> Submission {
    let acquired = self
      .state
      .busy
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_ok();
    if !acquired {
      self.state.dropped.fetch_add(1, Ordering::Relaxed);
      return Submission::Dropped;
    }

    let sent = self
      .sender
      .as_ref()
      .is_some_and(|sender| sender.send(frame).is_ok());
    if sent {
      Submission::Accepted
    } else {
      error!("帧处理线程已退出");
      self.state.busy.store(false, Ordering::Release);
      self.state.dropped.fetch_add(1, Ordering::Relaxed);
      Submission::Dropped
    }
  }

  pub fn is_busy(&self) -> bool {
    self.state.busy.load(Ordering::Acquire)
  }

  pub fn stats(&self) -> WorkerStats {
    WorkerStats {
      processed: self.state.processed.load(Ordering::Relaxed),
      dropped: self.state.dropped.load(Ordering::Relaxed),
      failed: self.state.failed.load(Ordering::Relaxed),
    }
  }

  /// 等待正在处理的帧完成并结束线程
  pub fn shutdown(mut self) -> WorkerStats {
    self.join();
    self.stats()
  }
}

impl<F> FrameWorker<F> {
  fn join(&mut self) {
    self.sender.take();
    if let Some(handle) = self.handle.take()
      && handle.join().is_err()
    {
      error!("帧处理线程异常退出");
    }
  }
}

impl<F> Drop for FrameWorker<F> {
  fn drop(&mut self) {
    self.join();
  }
}

/// 模拟相机节奏推送帧，处理忙时丢帧
#[derive(Debug)]
pub struct LiveTask {
  frame_interval: Duration,
  frame_number: Option<usize>,
  handle_interrupt: bool,
}

impl Default for LiveTask {
  fn default() -> Self {
    Self {
      frame_interval: Duration::from_millis(33),
      frame_number: None,
      handle_interrupt: true,
    }
  }
}

impl LiveTask {
  pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
    self.frame_interval = frame_interval;
    self
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_interrupt(mut self, handle_interrupt: bool) -> Self {
    self.handle_interrupt = handle_interrupt;
    self
  }

  pub fn run_with_stats<F, D, I, M, O>(
    self,
    input: I,
    model: M,
    output: O,
  ) -> anyhow::Result<WorkerStats>
  where
    F: Send + 'static,
    I: Iterator<Item = F>,
    M: Model<Input = F, Output = D> + Send + 'static,
    M::Error: Display,
    O: Render<F, D> + Send + 'static,
    O::Error: Display,
  {
    info!("开始实时任务, 帧间隔 {:.2?}", self.frame_interval);
    let interrupt = if self.handle_interrupt {
      Some(install_interrupt()?)
    } else {
      None
    };

    let worker = FrameWorker::spawn(model, output)?;
    for (i, frame) in input.enumerate() {
      let tick = Instant::now();
      if worker.submit(frame) == Submission::Dropped {
        debug!("第 {} 帧到达时仍在处理上一帧, 丢弃", i);
      }
      if self.frame_number.is_some_and(|n| i + 1 >= n) {
        info!("达到指定帧数 {}, 退出任务循环", i + 1);
        break;
      }
      if interrupt.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      if let Some(rest) = self.frame_interval.checked_sub(tick.elapsed()) {
        thread::sleep(rest);
      }
    }

    let stats = worker.shutdown();
    info!(
      "任务完成: 处理 {} 帧, 丢弃 {} 帧, 失败 {} 帧",
      stats.processed, stats.dropped, stats.failed
    );
    Ok(stats)
  }
}

impl<F, D, I, M, O> Task<I, M, O> for LiveTask
where
  F: Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D> + Send + 'static,
  M::Error: Display,
  O: Render<F, D> + Send + 'static,
  O::Error: Display,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    self.run_with_stats(input, model, output).map(|_| ())
  }
}
