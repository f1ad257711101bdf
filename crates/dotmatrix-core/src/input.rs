/// Buttons on the handheld. `Right`..`Down` form the direction group,
/// `A`..`Start` the action group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl Button {
    /// (direction group, line bit) for the 2x4 key matrix.
    fn line(self) -> (bool, u8) {
        match self {
            Button::Right => (true, 0x01),
            Button::Left => (true, 0x02),
            Button::Up => (true, 0x04),
            Button::Down => (true, 0x08),
            Button::A => (false, 0x01),
            Button::B => (false, 0x02),
            Button::Select => (false, 0x04),
            Button::Start => (false, 0x08),
        }
    }
}

/// Joypad register (0xFF00). Key lines are low-active; the two select bits
/// (4 = directions, 5 = actions) choose which half of the matrix drives the
/// low nibble.
pub struct Input {
    select: u8,
    directions: u8,
    actions: u8,
}

impl Input {
    pub fn new() -> Self {
        Self {
            select: 0x30,
            directions: 0,
            actions: 0,
        }
    }

    pub fn read(&self) -> u8 {
        let mut lines = 0x0F;
        if self.select & 0x10 == 0 {
            lines &= !self.directions;
        }
        if self.select & 0x20 == 0 {
            lines &= !self.actions;
        }
        0xC0 | self.select | (lines & 0x0F)
    }

    pub fn write(&mut self, val: u8) {
        self.select = val & 0x30;
    }

    /// Press a button, raising the input interrupt flag on the transition
    /// when the button's group is selected.
    pub fn press(&mut self, button: Button, if_reg: &mut u8) {
        let (directions, bit) = button.line();
        let group = if directions {
            &mut self.directions
        } else {
            &mut self.actions
        };
        let was_down = *group & bit != 0;
        *group |= bit;

        let selected = if directions {
            self.select & 0x10 == 0
        } else {
            self.select & 0x20 == 0
        };
        if !was_down && selected {
            *if_reg |= 0x10;
        }
    }

    pub fn release(&mut self, button: Button) {
        let (directions, bit) = button.line();
        if directions {
            self.directions &= !bit;
        } else {
            self.actions &= !bit;
        }
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_group_drives_low_nibble() {
        let mut input = Input::new();
        let mut if_reg = 0u8;

        // Select directions only.
        input.write(0x20);
        input.press(Button::Left, &mut if_reg);
        assert_eq!(input.read() & 0x0F, 0x0D);

        // Switching to actions hides the held direction.
        input.write(0x10);
        assert_eq!(input.read() & 0x0F, 0x0F);
    }

    #[test]
    fn press_raises_interrupt_once() {
        let mut input = Input::new();
        let mut if_reg = 0u8;

        input.write(0x10);
        input.press(Button::Start, &mut if_reg);
        assert_eq!(if_reg & 0x10, 0x10);

        // Holding the button does not retrigger.
        if_reg = 0;
        input.press(Button::Start, &mut if_reg);
        assert_eq!(if_reg, 0);

        input.release(Button::Start);
        input.press(Button::Start, &mut if_reg);
        assert_eq!(if_reg & 0x10, 0x10);
    }

    #[test]
    fn unselected_group_does_not_interrupt() {
        let mut input = Input::new();
        let mut if_reg = 0u8;

        // Both select bits high: nothing selected.
        input.write(0x30);
        input.press(Button::A, &mut if_reg);
        assert_eq!(if_reg, 0);
    }
}
