use rand::seq::IndexedRandom;
use rand::Rng;

use crate::models::card::Uid;

/// Card reader polled by the board loop
pub trait RfidReader {
    fn is_new_card_present(&mut self) -> bool;

    /// Read the serial of the card found by `is_new_card_present`
    fn read_card_serial(&mut self) -> bool;

    fn uid(&self) -> Uid;
}

/// Reader that taps random cards from a fixed set
///
/// A card is tapped with probability `tap_probability` per poll. The same
/// card is tapped again later, ending the session it started.
pub struct SimulatedReader<R: Rng> {
    cards: Vec<Uid>,
    tap_probability: f64,
    rng: R,
    holder: Option<Uid>,
    in_field: Option<Uid>,
}

impl<R: Rng> SimulatedReader<R> {
    pub fn new(cards: Vec<Uid>, tap_probability: f64, rng: R) -> Self {
        Self {
            cards,
            tap_probability: tap_probability.clamp(0.0, 1.0),
            rng,
            holder: None,
            in_field: None,
        }
    }
}

impl<R: Rng> RfidReader for SimulatedReader<R> {
    fn is_new_card_present(&mut self) -> bool {
        // A tapped card leaves the field on the next poll
        if self.in_field.take().is_some() {
            return false;
        }

        if !self.rng.random_bool(self.tap_probability) {
            return false;
        }

        let card = match self.holder.take() {
            Some(card) => card,
            None => match self.cards.choose(&mut self.rng) {
                Some(card) => {
                    self.holder = Some(*card);
                    *card
                }
                None => return false,
            },
        };

        tracing::debug!(uid = %card, "Simulated card tap");
        self.in_field = Some(card);
        true
    }

    fn read_card_serial(&mut self) -> bool {
        self.in_field.is_some()
    }

    fn uid(&self) -> Uid {
        self.in_field.unwrap_or(Uid::INVALID)
    }
}
