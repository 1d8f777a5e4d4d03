use num::FromPrimitive;

use super::interrupt::{self, Interrupt, InterruptConnect, SharedInterruptFlags};
use super::iodev::consts::*;

use arm7tdmi::Addr;

bitfield! {
    #[derive(Serialize, Deserialize, Default, Copy, Clone)]
    pub struct TimerCtl(u16);
    impl Debug;
    u16;
    prescalar, _ : 1, 0;
    cascade, _ : 2;
    irq_enabled, _ : 6;
    enabled, set_enabled : 7;
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Timer {
    pub ctl: TimerCtl,
    pub data: u16,
    pub initial_data: u16,

    irq: Interrupt,
    timer_id: usize,
    cycles: usize,
}

impl Timer {
    pub fn new(timer_id: usize) -> Timer {
        if timer_id > 3 {
            panic!("invalid timer id {}", timer_id);
        }
        Timer {
            timer_id,
            irq: Interrupt::from_usize(timer_id + 3).unwrap(),
            data: 0,
            ctl: TimerCtl(0),
            initial_data: 0,
            cycles: 0,
        }
    }

    fn frequency(&self) -> usize {
        match self.ctl.prescalar() {
            0 => 1,
            1 => 64,
            2 => 256,
            _ => 1024,
        }
    }

    /// Count `ticks` increments, returning how many times the counter
    /// overflowed and reloaded.
    fn update(&mut self, ticks: usize, interrupt_flags: &SharedInterruptFlags) -> usize {
        let mut num_overflows = 0;
        let mut remaining = ticks;
        while remaining > 0 {
            let until_overflow = 0x1_0000 - self.data as usize;
            if remaining < until_overflow {
                self.data += remaining as u16;
                break;
            }
            remaining -= until_overflow;
            self.data = self.initial_data;
            num_overflows += 1;
            trace!("TMR{} overflowed", self.timer_id);
            if self.ctl.irq_enabled() {
                interrupt::signal_irq(interrupt_flags, self.irq);
            }
        }
        num_overflows
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Timers {
    timers: [Timer; 4],
    #[serde(skip)]
    interrupt_flags: SharedInterruptFlags,
}

impl InterruptConnect for Timers {
    fn connect_irq(&mut self, interrupt_flags: SharedInterruptFlags) {
        self.interrupt_flags = interrupt_flags;
    }
}

impl std::ops::Index<usize> for Timers {
    type Output = Timer;
    fn index(&self, index: usize) -> &Self::Output {
        &self.timers[index]
    }
}

impl std::ops::IndexMut<usize> for Timers {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.timers[index]
    }
}

impl Timers {
    pub fn new(interrupt_flags: SharedInterruptFlags) -> Timers {
        Timers {
            timers: [Timer::new(0), Timer::new(1), Timer::new(2), Timer::new(3)],
            interrupt_flags,
        }
    }

    pub fn reset(&mut self) {
        for id in 0..4 {
            self.timers[id] = Timer::new(id);
        }
    }

    pub fn write_timer_ctl(&mut self, id: usize, value: u16) {
        let old_enabled = self.timers[id].ctl.enabled();
        self.timers[id].ctl = TimerCtl(value);
        let new_enabled = self.timers[id].ctl.enabled();
        if !old_enabled && new_enabled {
            // an enable edge reloads the counter
            self.timers[id].data = self.timers[id].initial_data;
            self.timers[id].cycles = 0;
        }
    }

    pub fn handle_read(&self, io_addr: Addr) -> u16 {
        match io_addr {
            REG_TM0CNT_L => self.timers[0].data,
            REG_TM0CNT_H => self.timers[0].ctl.0,
            REG_TM1CNT_L => self.timers[1].data,
            REG_TM1CNT_H => self.timers[1].ctl.0,
            REG_TM2CNT_L => self.timers[2].data,
            REG_TM2CNT_H => self.timers[2].ctl.0,
            REG_TM3CNT_L => self.timers[3].data,
            REG_TM3CNT_H => self.timers[3].ctl.0,
            _ => unreachable!(),
        }
    }

    pub fn handle_write(&mut self, io_addr: Addr, value: u16) {
        match io_addr {
            REG_TM0CNT_L => {
                self.timers[0].data = value;
                self.timers[0].initial_data = value;
            }
            REG_TM0CNT_H => self.write_timer_ctl(0, value),
            REG_TM1CNT_L => {
                self.timers[1].data = value;
                self.timers[1].initial_data = value;
            }
            REG_TM1CNT_H => self.write_timer_ctl(1, value),
            REG_TM2CNT_L => {
                self.timers[2].data = value;
                self.timers[2].initial_data = value;
            }
            REG_TM2CNT_H => self.write_timer_ctl(2, value),
            REG_TM3CNT_L => {
                self.timers[3].data = value;
                self.timers[3].initial_data = value;
            }
            REG_TM3CNT_H => self.write_timer_ctl(3, value),
            _ => unreachable!(),
        }
    }

    fn update_timer(&mut self, id: usize, cycles: usize) -> usize {
        let flags = self.interrupt_flags.clone();
        let timer = &mut self.timers[id];
        timer.cycles += cycles;
        let freq = timer.frequency();
        let ticks = timer.cycles / freq;
        timer.cycles %= freq;
        timer.update(ticks, &flags)
    }

    /// Drive the prescaled timers; overflows cascade into the next timer
    /// when it is in count-up mode.
    pub fn step(&mut self, cycles: usize) {
        for id in 0..4 {
            if !self.timers[id].ctl.enabled() || self.timers[id].ctl.cascade() {
                continue;
            }
            let mut overflows = self.update_timer(id, cycles);
            let mut next = id + 1;
            while overflows > 0 && next < 4 {
                if !(self.timers[next].ctl.enabled() && self.timers[next].ctl.cascade()) {
                    break;
                }
                let flags = self.interrupt_flags.clone();
                overflows = self.timers[next].update(overflows, &flags);
                next += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::IrqBitmask;
    use std::cell::Cell;
    use std::rc::Rc;

    fn make_timers() -> (Timers, SharedInterruptFlags) {
        let flags: SharedInterruptFlags = Rc::new(Cell::new(IrqBitmask(0)));
        (Timers::new(flags.clone()), flags)
    }

    #[test]
    fn counts_at_full_clock() {
        let (mut timers, _flags) = make_timers();
        timers.handle_write(REG_TM0CNT_L, 0);
        timers.handle_write(REG_TM0CNT_H, 1 << 7); // enable, prescaler 1
        timers.step(100);
        assert_eq!(timers.handle_read(REG_TM0CNT_L), 100);
    }

    #[test]
    fn overflow_reloads_and_raises_irq() {
        let (mut timers, flags) = make_timers();
        timers.handle_write(REG_TM0CNT_L, 0xfffe);
        timers.handle_write(REG_TM0CNT_H, (1 << 7) | (1 << 6)); // enable + irq
        timers.step(2);
        assert_eq!(timers.handle_read(REG_TM0CNT_L), 0xfffe);
        assert!(flags.get().Timer0_Overflow());
    }

    #[test]
    fn prescaler_divides() {
        let (mut timers, _flags) = make_timers();
        timers.handle_write(REG_TM1CNT_L, 0);
        timers.handle_write(REG_TM1CNT_H, (1 << 7) | 1); // enable, prescaler 64
        timers.step(64 * 3 + 63);
        assert_eq!(timers.handle_read(REG_TM1CNT_L), 3);
    }

    #[test]
    fn cascade_counts_overflows() {
        let (mut timers, flags) = make_timers();
        // tm0 overflows every tick
        timers.handle_write(REG_TM0CNT_L, 0xffff);
        timers.handle_write(REG_TM0CNT_H, 1 << 7);
        // tm1 cascades from tm0
        timers.handle_write(REG_TM1CNT_L, 0xffff);
        timers.handle_write(REG_TM1CNT_H, (1 << 7) | (1 << 2) | (1 << 6));
        timers.step(1);
        assert!(flags.get().Timer1_Overflow());
    }
}
