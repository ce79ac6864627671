//! Trading-hour windows.
//!
//! Windows are daily, in local time. A window whose end precedes its start
//! wraps past midnight (the night session `15:00 → 05:00`).

use chrono::{Local, NaiveTime};
use ft_core::config::TradingWindow;
use ft_core::error::FtError;

#[derive(Debug, Clone, PartialEq)]
pub struct TradingHours {
    windows: Vec<(NaiveTime, NaiveTime)>,
    always: bool,
}

impl TradingHours {
    pub fn from_config(windows: &[TradingWindow]) -> Result<Self, FtError> {
        let windows = windows
            .iter()
            .map(TradingWindow::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            windows,
            always: false,
        })
    }

    /// Hours that never close. Used for simulation and tests.
    pub fn always_open() -> Self {
        Self {
            windows: Vec::new(),
            always: true,
        }
    }

    /// Hours that never open.
    pub fn never_open() -> Self {
        Self {
            windows: Vec::new(),
            always: false,
        }
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.always {
            return true;
        }
        self.windows.iter().any(|&(start, end)| {
            if start == end {
                true
            } else if start < end {
                t >= start && t < end
            } else {
                t >= start || t < end
            }
        })
    }

    pub fn is_open_now(&self) -> bool {
        self.contains(Local::now().time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn taifex() -> TradingHours {
        TradingHours::from_config(&[
            TradingWindow {
                start: "08:45".into(),
                end: "13:45".into(),
            },
            TradingWindow {
                start: "15:00".into(),
                end: "05:00".into(),
            },
        ])
        .unwrap()
    }

    #[test]
    fn day_session() {
        let hours = taifex();
        assert!(hours.contains(t(8, 45)));
        assert!(hours.contains(t(13, 44)));
        assert!(!hours.contains(t(13, 45)));
        assert!(!hours.contains(t(8, 44)));
    }

    #[test]
    fn night_session_wraps_midnight() {
        let hours = taifex();
        assert!(hours.contains(t(15, 0)));
        assert!(hours.contains(t(23, 59)));
        assert!(hours.contains(t(0, 30)));
        assert!(hours.contains(t(4, 59)));
        assert!(!hours.contains(t(5, 0)));
        assert!(!hours.contains(t(14, 30)));
    }

    #[test]
    fn fixed_hours() {
        assert!(TradingHours::always_open().contains(t(3, 0)));
        assert!(!TradingHours::never_open().contains(t(10, 0)));
    }
}
