use nanoid::nanoid;
use std::sync::atomic::{AtomicUsize, Ordering};

// ==========================================
// ID 生成工具 (Identity Utilities)
// ==========================================

/// 生成任务 ID (NanoID)
///
/// 仅用于日志追踪，字符集不含 `-` 和 `_`，方便双击选中。
#[inline]
pub fn new_task_id() -> String {
    const ALPHABET: [char; 62] = [
        '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h',
        'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
        'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
        'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
    ];
    nanoid!(10, &ALPHABET)
}

static TIMER_SERIAL: AtomicUsize = AtomicUsize::new(0);

/// 默认工作线程名: `talos-timer-<序号>`
pub fn next_thread_name() -> String {
    format!(
        "talos-timer-{}",
        TIMER_SERIAL.fetch_add(1, Ordering::Relaxed)
    )
}
