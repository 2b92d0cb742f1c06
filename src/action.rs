use crate::error::{Result, TrainError};

pub const ACTION_COUNT: usize = 6;

/// Human-readable labels, indexed by action.
pub const ACTION_LABELS: [&str; ACTION_COUNT] = [
    "Forward",
    "Stop",
    "Half left turn",
    "Half right turn",
    "Full left turn",
    "Full right turn",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Forward,
    Stop,
    HalfLeft,
    HalfRight,
    FullLeft,
    FullRight,
}

impl Action {
    pub const ALL: [Action; ACTION_COUNT] = [
        Action::Forward,
        Action::Stop,
        Action::HalfLeft,
        Action::HalfRight,
        Action::FullLeft,
        Action::FullRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        ACTION_LABELS[self.index()]
    }

    pub fn control(self) -> VehicleControl {
        let (throttle, brake, steer) = match self {
            Action::Forward => (0.4, 0.0, 0.0),
            Action::Stop => (0.0, 1.0, 0.0),
            Action::HalfLeft => (0.4, 0.0, -0.3),
            Action::HalfRight => (0.4, 0.0, 0.3),
            Action::FullLeft => (0.4, 0.0, -0.7),
            Action::FullRight => (0.4, 0.0, 0.7),
        };
        VehicleControl {
            throttle,
            brake,
            steer,
        }
    }
}

impl TryFrom<usize> for Action {
    type Error = TrainError;

    fn try_from(index: usize) -> Result<Self> {
        Action::ALL
            .get(index)
            .copied()
            .ok_or(TrainError::InvalidAction(index))
    }
}

/// Control command applied to the vehicle for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VehicleControl {
    pub throttle: f32,
    pub brake: f32,
    pub steer: f32,
}

/// Maps a raw agent decision onto a validated action and its control.
pub fn to_control(index: usize) -> Result<(Action, VehicleControl)> {
    let action = Action::try_from(index)?;
    Ok((action, action.control()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_reproduced_exactly() {
        let expected = [
            (0.4, 0.0, 0.0),
            (0.0, 1.0, 0.0),
            (0.4, 0.0, -0.3),
            (0.4, 0.0, 0.3),
            (0.4, 0.0, -0.7),
            (0.4, 0.0, 0.7),
        ];
        for (index, (throttle, brake, steer)) in expected.into_iter().enumerate() {
            let (action, control) = to_control(index).unwrap();
            assert_eq!(action.index(), index);
            assert_eq!(
                control,
                VehicleControl {
                    throttle,
                    brake,
                    steer
                }
            );
        }
    }

    #[test]
    fn stop_brakes_fully() {
        let (_, control) = to_control(1).unwrap();
        assert_eq!((control.throttle, control.brake, control.steer), (0.0, 1.0, 0.0));
    }

    #[test]
    fn turns_keep_throttle() {
        for index in 2..=5 {
            let (_, control) = to_control(index).unwrap();
            assert_eq!(control.throttle, 0.4);
            assert_eq!(control.brake, 0.0);
        }
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert!(matches!(to_control(6), Err(TrainError::InvalidAction(6))));
        assert!(matches!(
            Action::try_from(usize::MAX),
            Err(TrainError::InvalidAction(usize::MAX))
        ));
    }

    #[test]
    fn labels_follow_indices() {
        assert_eq!(Action::Forward.label(), "Forward");
        assert_eq!(Action::FullRight.label(), "Full right turn");
    }
}
