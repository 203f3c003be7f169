use core::time::Duration;

use esp_hal::{
    peripherals::LPWR,
    rtc_cntl::{Rtc, SocResetReason, reset_reason, sleep::TimerWakeupSource, wakeup_cause},
    system::{Cpu, SleepSource},
};
use lapsecam_core::cycle::{SLEEP_INTERVAL_SECS, WakeCause};
use log::info;

const RESTART_GRACE_MS: u64 = 250;

// Only a deep-sleep timer expiry counts as a timer wake; every other reset
// path gets the long first-boot serving window.
pub(super) fn boot_wake_cause() -> WakeCause {
    let reset = reset_reason(Cpu::ProCpu);
    if reset == Some(SocResetReason::CoreDeepSleep) {
        match wakeup_cause() {
            SleepSource::Timer => WakeCause::TimerWake,
            other => {
                info!("power: deep sleep ended by {:?}", other);
                WakeCause::Other
            }
        }
    } else if reset == Some(SocResetReason::ChipPowerOn) {
        WakeCause::FirstBoot
    } else {
        info!("power: reset reason {:?}", reset);
        WakeCause::Other
    }
}

pub(super) fn enter_deep_sleep() -> ! {
    info!("power: deep sleeping for {}s", SLEEP_INTERVAL_SECS);
    let timer = TimerWakeupSource::new(Duration::from_secs(SLEEP_INTERVAL_SECS));
    let mut rtc = Rtc::new(unsafe { LPWR::steal() });
    rtc.sleep_deep(&[&timer]);
}

pub(super) async fn restart() -> ! {
    // Let the final HTTP response drain before the reset.
    embassy_time::Timer::after_millis(RESTART_GRACE_MS).await;
    esp_hal::system::software_reset()
}
