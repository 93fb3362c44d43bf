//! Aides and their weekly availability.

use super::{ServiceError, ServiceResult};
use crate::config::BusinessHours;
use crate::model::aide::{Aide, AideId, AvailabilityWindow};
use crate::repo::AideRepository;
use chrono::{NaiveTime, Weekday};
use log::info;

pub struct RosterService<'s, S> {
    store: &'s S,
    business_hours: BusinessHours,
}

impl<'s, S> RosterService<'s, S>
where
    S: AideRepository,
{
    pub fn new(store: &'s S, business_hours: BusinessHours) -> Self {
        Self {
            store,
            business_hours,
        }
    }

    pub fn create_aide(&self, aide: Aide) -> ServiceResult<Aide> {
        self.store.create_aide(&aide)?;
        info!("event=aide_create module=roster status=ok aide_id={}", aide.id);
        Ok(aide)
    }

    /// Deletes the aide. Its occurrences stay, unassigned.
    pub fn delete_aide(&self, id: AideId) -> ServiceResult<()> {
        self.store.delete_aide(id)?;
        info!("event=aide_delete module=roster status=ok aide_id={id}");
        Ok(())
    }

    /// Sets the aide's window for `weekday`, replacing any existing one.
    pub fn set_availability(
        &self,
        aide_id: AideId,
        weekday: Weekday,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> ServiceResult<AvailabilityWindow> {
        let window = AvailabilityWindow::new(aide_id, weekday, start_time, end_time);
        window.validate(&self.business_hours)?;
        self.ensure_aide(aide_id)?;

        let stored = self.store.upsert_availability(&window)?;
        info!(
            "event=availability_set module=roster status=ok aide_id={aide_id} weekday={weekday}"
        );
        Ok(stored)
    }

    pub fn remove_availability(&self, aide_id: AideId, weekday: Weekday) -> ServiceResult<()> {
        self.store.delete_availability(aide_id, weekday)?;
        info!(
            "event=availability_remove module=roster status=ok aide_id={aide_id} weekday={weekday}"
        );
        Ok(())
    }

    pub fn list_availability(&self, aide_id: AideId) -> ServiceResult<Vec<AvailabilityWindow>> {
        self.ensure_aide(aide_id)?;
        Ok(self.store.list_availability(aide_id)?)
    }

    fn ensure_aide(&self, aide_id: AideId) -> ServiceResult<()> {
        match self.store.get_aide(aide_id)? {
            Some(_) => Ok(()),
            None => Err(ServiceError::not_found("aide", aide_id)),
        }
    }
}
