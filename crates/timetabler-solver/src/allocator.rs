//! Room and lab allocation.
//!
//! Pure lookup over the room inventory plus the run's allocation context.
//! Returning `None` means "no compatible room free" — the caller treats it
//! as could-not-schedule and tries another slot; it is never an error.
//!
//! Rules enforced here:
//! - practicals use labs exclusively, and every block of one session uses
//!   the lab recorded in the context (same-lab rule)
//! - theory prefers regular rooms; senior cohorts fall back to labs freely,
//!   junior cohorts only while the senior lab reserve stays intact
//! - rooms must hold the class-group; candidates are tried largest first

use chrono::Weekday;
use timetabler_core::{ClassGroup, Classroom, ConstraintParams};

use crate::context::AllocationContext;

/// Deterministic room chooser for one scheduling run.
pub struct RoomAllocator<'a> {
    /// Labs, capacity-descending then name
    labs: Vec<&'a Classroom>,
    /// Regular rooms, capacity-descending then name
    regular: Vec<&'a Classroom>,
    /// Labs held back for senior theory
    reserve: usize,
}

impl<'a> RoomAllocator<'a> {
    pub fn new(rooms: &'a [Classroom], params: &ConstraintParams) -> Self {
        let mut labs: Vec<&Classroom> = rooms.iter().filter(|r| r.is_lab).collect();
        let mut regular: Vec<&Classroom> = rooms.iter().filter(|r| !r.is_lab).collect();
        let by_size = |a: &&Classroom, b: &&Classroom| {
            b.capacity.cmp(&a.capacity).then_with(|| a.name.cmp(&b.name))
        };
        labs.sort_by(by_size);
        regular.sort_by(by_size);

        let reserve = usize::from(params.senior_lab_reserve).min(labs.len().saturating_sub(2));
        Self {
            labs,
            regular,
            reserve,
        }
    }

    pub fn lab_count(&self) -> usize {
        self.labs.len()
    }

    pub fn has_labs(&self) -> bool {
        !self.labs.is_empty()
    }

    /// Lab for one practical session block.
    ///
    /// Once a lab is recorded for (group, subject, day) only that lab is
    /// ever returned again; if it is not free for the whole window the
    /// session cannot be placed there and the caller must look elsewhere.
    pub fn for_practical(
        &self,
        ctx: &AllocationContext,
        group: &ClassGroup,
        subject: &str,
        day: Weekday,
        start_period: u8,
        block_len: u8,
    ) -> Option<&'a Classroom> {
        let window = start_period..start_period + block_len;

        if let Some(name) = ctx.session_lab(&group.code, subject, day) {
            let lab = self.labs.iter().find(|l| l.name == name)?;
            return window
                .clone()
                .all(|p| ctx.is_room_free(&lab.name, day, p))
                .then_some(*lab);
        }

        self.labs
            .iter()
            .find(|lab| {
                lab.capacity >= group.size
                    && window.clone().all(|p| ctx.is_room_free(&lab.name, day, p))
            })
            .copied()
    }

    /// Room for a single theory period.
    pub fn for_theory(
        &self,
        ctx: &AllocationContext,
        group: &ClassGroup,
        day: Weekday,
        period: u8,
    ) -> Option<&'a Classroom> {
        let fits_and_free = |room: &&&Classroom| {
            room.capacity >= group.size && ctx.is_room_free(&room.name, day, period)
        };

        if let Some(room) = self.regular.iter().find(fits_and_free) {
            return Some(*room);
        }

        // No regular room left: labs, subject to the seniority rule.
        let free_labs = self
            .labs
            .iter()
            .filter(|l| ctx.is_room_free(&l.name, day, period))
            .count();
        if !group.is_senior() && free_labs <= self.reserve {
            return None;
        }
        self.labs.iter().find(fits_and_free).copied()
    }
}
