// src/sched/load.rs

//! System load sampling for launch backpressure.

/// One-minute load average, if the platform can report it.
pub fn load_average_1m() -> Option<f64> {
    #[cfg(unix)]
    {
        let mut loads = [0f64; 1];
        // getloadavg returns the number of samples it filled, or -1.
        let filled = unsafe { libc::getloadavg(loads.as_mut_ptr(), 1) };
        if filled == 1 {
            return Some(loads[0]);
        }
        None
    }
    #[cfg(not(unix))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn load_average_is_reported_and_sane() {
        let load = load_average_1m().expect("unix reports a load average");
        assert!(load >= 0.0);
    }
}
