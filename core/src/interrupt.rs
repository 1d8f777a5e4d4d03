use std::cell::Cell;
use std::rc::Rc;

/// The 14 interrupt sources of the platform, by IF/IE bit position.
#[derive(Serialize, Deserialize, Debug, Primitive, Copy, Clone, PartialEq)]
#[allow(non_camel_case_types)]
pub enum Interrupt {
    LCD_VBlank = 0,
    LCD_HBlank = 1,
    LCD_VCounterMatch = 2,
    Timer0_Overflow = 3,
    Timer1_Overflow = 4,
    Timer2_Overflow = 5,
    Timer3_Overflow = 6,
    SerialCommunication = 7,
    DMA0 = 8,
    DMA1 = 9,
    DMA2 = 10,
    DMA3 = 11,
    Keypad = 12,
    GamePak = 13,
}

/// The raised-interrupt latch (IF) is shared between the peripherals that
/// raise interrupts and the controller that serves them.
pub type SharedInterruptFlags = Rc<Cell<IrqBitmask>>;

#[inline]
pub fn signal_irq(interrupt_flags: &SharedInterruptFlags, i: Interrupt) {
    let mut flags = interrupt_flags.get();
    flags.add_irq(i);
    interrupt_flags.set(flags);
}

impl IrqBitmask {
    pub fn add_irq(&mut self, i: Interrupt) {
        self.0 |= 1 << (i as usize);
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Peripherals holding a clone of the shared IF latch implement this so the
/// latch can be re-distributed after a savestate restore.
pub trait InterruptConnect {
    fn connect_irq(&mut self, interrupt_flags: SharedInterruptFlags);
}

bitfield! {
    #[derive(Serialize, Deserialize, Default, Copy, Clone, PartialEq)]
    pub struct IrqBitmask(u16);
    impl Debug;
    u16;
    #[allow(non_snake_case)]
    pub LCD_VBlank, set_LCD_VBlank: 0;
    #[allow(non_snake_case)]
    pub LCD_HBlank, set_LCD_HBlank: 1;
    #[allow(non_snake_case)]
    pub LCD_VCounterMatch, set_LCD_VCounterMatch: 2;
    #[allow(non_snake_case)]
    pub Timer0_Overflow, set_Timer0_Overflow: 3;
    #[allow(non_snake_case)]
    pub Timer1_Overflow, set_Timer1_Overflow: 4;
    #[allow(non_snake_case)]
    pub Timer2_Overflow, set_Timer2_Overflow: 5;
    #[allow(non_snake_case)]
    pub Timer3_Overflow, set_Timer3_Overflow: 6;
    #[allow(non_snake_case)]
    pub SerialCommunication, set_SerialCommunication: 7;
    #[allow(non_snake_case)]
    pub DMA0, set_DMA0: 8;
    #[allow(non_snake_case)]
    pub DMA1, set_DMA1: 9;
    #[allow(non_snake_case)]
    pub DMA2, set_DMA2: 10;
    #[allow(non_snake_case)]
    pub DMA3, set_DMA3: 11;
    #[allow(non_snake_case)]
    pub Keypad, set_Keypad: 12;
    #[allow(non_snake_case)]
    pub GamePak, set_GamePak: 13;
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InterruptController {
    pub interrupt_master_enable: bool,
    pub interrupt_enable: IrqBitmask,
    #[serde(skip)]
    interrupt_flags: SharedInterruptFlags,
}

impl InterruptConnect for InterruptController {
    fn connect_irq(&mut self, interrupt_flags: SharedInterruptFlags) {
        self.interrupt_flags = interrupt_flags;
    }
}

impl InterruptController {
    pub fn new(interrupt_flags: SharedInterruptFlags) -> InterruptController {
        InterruptController {
            interrupt_master_enable: false,
            interrupt_enable: IrqBitmask(0),
            interrupt_flags,
        }
    }

    /// An interrupt line is served when IME is set and the line is both
    /// raised and enabled.
    pub fn irq_pending(&self) -> bool {
        self.interrupt_master_enable
            && (self.interrupt_flags.get().value() & self.interrupt_enable.value()) != 0
    }

    pub fn read_interrupt_flags(&self) -> u16 {
        self.interrupt_flags.get().value()
    }

    /// IF writes acknowledge: a set bit clears the corresponding latch.
    pub fn write_interrupt_flags(&mut self, value: u16) {
        let flags = self.interrupt_flags.get();
        self.interrupt_flags.set(IrqBitmask(flags.value() & !value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_requires_ime_enable_and_flag() {
        let flags = Rc::new(Cell::new(IrqBitmask(0)));
        let mut intc = InterruptController::new(flags.clone());

        signal_irq(&flags, Interrupt::LCD_VBlank);
        assert!(!intc.irq_pending());

        intc.interrupt_enable = IrqBitmask(1);
        assert!(!intc.irq_pending());

        intc.interrupt_master_enable = true;
        assert!(intc.irq_pending());

        intc.write_interrupt_flags(1);
        assert!(!intc.irq_pending());
    }
}
