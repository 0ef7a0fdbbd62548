//! 虚拟化列表的测量核心
//!
//! 给定估算行高和总条目数（如有后续分页再加一行合成的 loader 行），
//! 计算总滚动高度和当前滚动位置应当物化的行区间（视口外各留 overscan 行
//! 缓冲，减少快速滚动时的白屏）。物化行数有上界：
//! 可见行数 + 2×overscan，与总条目数无关。

/// 虚拟化参数
#[derive(Debug, Clone, Copy)]
pub struct VirtualListConfig {
    /// 估算行高（像素）
    pub estimated_row_height: f64,
    /// 视口外额外物化的行数（上下各一侧）
    pub overscan: usize,
}

impl Default for VirtualListConfig {
    fn default() -> Self {
        Self {
            estimated_row_height: 120.0,
            overscan: 5,
        }
    }
}

/// 一次测量的结果：应当物化的行区间
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualSlice {
    /// 起始行下标（含）
    pub start: usize,
    /// 结束行下标（不含）
    pub end: usize,
    /// 总滚动高度（含 loader 行）
    pub total_size: f64,
    /// loader 行是否在物化区间内
    pub loader_visible: bool,
}

impl VirtualSlice {
    pub fn indices(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl VirtualListConfig {
    /// 行的绝对偏移（用于绝对定位渲染）
    pub fn row_start(&self, index: usize) -> f64 {
        index as f64 * self.estimated_row_height
    }

    /// 计算当前滚动位置应当物化的行区间
    ///
    /// `item_count` 是真实条目数；`has_next` 为 true 时在末尾追加一行
    /// 合成 loader 行。返回区间对真实条目的覆盖不超过
    /// 可见行数 + 2×overscan。
    pub fn slice(
        &self,
        scroll_offset: f64,
        viewport_height: f64,
        item_count: usize,
        has_next: bool,
    ) -> VirtualSlice {
        let row_count = item_count + usize::from(has_next);
        let total_size = row_count as f64 * self.estimated_row_height;

        if row_count == 0 {
            return VirtualSlice {
                start: 0,
                end: 0,
                total_size,
                loader_visible: false,
            };
        }

        let offset = scroll_offset.max(0.0);
        let first_visible =
            ((offset / self.estimated_row_height).floor() as usize).min(row_count - 1);
        let last_visible = (((offset + viewport_height.max(0.0)) / self.estimated_row_height)
            .ceil() as usize)
            .clamp(first_visible + 1, row_count);

        let start = first_visible.saturating_sub(self.overscan);
        let end = (last_visible + self.overscan).min(row_count);

        VirtualSlice {
            start,
            end,
            total_size,
            loader_visible: has_next && end == row_count,
        }
    }
}

/// 分页触发守卫
///
/// 当 loader 行进入物化区间、还有后续页且没有加载在途时触发一次
/// load-more；加载完成调用 `finish()` 重新武装。
#[derive(Debug, Default)]
pub struct LoadMoreGuard {
    in_flight: bool,
}

impl LoadMoreGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 观察一次测量结果，返回 true 表示调用方应当发起加载（恰好触发一次）
    pub fn should_load(&mut self, slice: &VirtualSlice, item_count: usize, has_next: bool) -> bool {
        if !has_next || self.in_flight || slice.is_empty() {
            return false;
        }
        let last_index = slice.end - 1;
        if last_index >= item_count {
            self.in_flight = true;
            return true;
        }
        false
    }

    /// 一次加载结束（无论成败），重新允许触发
    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }
}
