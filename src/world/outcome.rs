use crate::entities::item::ItemId;
use thiserror::Error;

/// Outcome taxonomy shared by every holder query and world transaction.
/// The display strings are the cancel messages a player sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ReturnValue {
    #[error("Sorry, not possible.")]
    NotPossible,
    #[error("There is not enough room.")]
    NotEnoughRoom,
    #[error("You cannot put more objects in this container.")]
    ContainerNotEnoughRoom,
    #[error("This object is too heavy for you to carry.")]
    NotEnoughCapacity,
    #[error("You cannot move this object.")]
    NotMoveable,
    #[error("You cannot take this object.")]
    NotPickupable,
    #[error("This is impossible.")]
    ThisIsImpossible,
    #[error("You cannot dress this object there.")]
    CannotBeDressed,
    #[error("Sorry, not possible.")]
    NeedExchange,
    #[error("Destination is out of reach.")]
    OutOfRange,
    #[error("Too far away.")]
    TooFarAway,
    #[error("There is no way.")]
    NoWay,
    #[error("First go upstairs.")]
    FirstGoUpstairs,
    #[error("First go downstairs.")]
    FirstGoDownstairs,
    #[error("You are exhausted.")]
    YouAreExhausted,
    #[error("You are already trading.")]
    AlreadyTrading,
    #[error("This person is already trading.")]
    ThisPlayerAlreadyTrading,
    #[error("This item is already being traded.")]
    ItemAlreadyTraded,
    #[error("You do not have enough money.")]
    NotEnoughMoney,
    #[error("A player with this name is not online.")]
    PlayerNotOnline,
    #[error("The name is too ambiguous.")]
    NameIsTooAmbiguous,
    #[error("You may not attack this creature.")]
    YouMayNotAttackThisCreature,
}

impl ReturnValue {
    /// Failures a player intent may answer by walking closer and retrying.
    pub fn is_range_failure(self) -> bool {
        matches!(self, ReturnValue::OutOfRange | ReturnValue::TooFarAway)
    }
}

/// Answer of `Holder::query_add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddQuery {
    Ok,
    /// The requested slot is occupied; a swap with this item may make room.
    NeedExchange(ItemId),
    Fail(ReturnValue),
}

impl AddQuery {
    pub fn is_ok(self) -> bool {
        matches!(self, AddQuery::Ok)
    }

    pub fn into_result(self) -> Result<(), ReturnValue> {
        match self {
            AddQuery::Ok => Ok(()),
            AddQuery::NeedExchange(_) => Err(ReturnValue::NeedExchange),
            AddQuery::Fail(reason) => Err(reason),
        }
    }
}

/// Result of a successful move. `clamped` carries the destination's reason when
/// only part of a stack fit, in which case `moved` is less than requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub moved: u16,
    /// Object now holding the moved units at the destination.
    pub item: Option<ItemId>,
    pub clamped: Option<ReturnValue>,
}

impl MoveOutcome {
    pub fn is_partial(&self) -> bool {
        self.clamped.is_some()
    }
}
