use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{Calendar, Component, Event, EventLike, EventStatus as IcsStatus};

use crate::models::{CalendarEvent, EventStatus};

#[derive(Clone)]
pub struct ICalExporter {
    name: String,
    timezone: Tz,
}

impl ICalExporter {
    pub fn new(name: impl Into<String>, timezone: Tz) -> Self {
        Self {
            name: name.into(),
            timezone,
        }
    }

    pub fn generate(&self, events: &[CalendarEvent]) -> Vec<u8> {
        let mut calendar = Calendar::new();
        calendar.name(&self.name);

        for item in events {
            let tz = item.timezone.parse::<Tz>().unwrap_or(self.timezone);
            let day = item.event_date.with_timezone(&tz).date_naive();

            let mut event = Event::new();
            event.summary(&item.title);
            event.description(&item.description);
            event.uid(&format!("{}@school-calendar", item.id));
            event.add_property("CATEGORIES", item.event_category.as_str().to_uppercase());
            event.status(match item.status {
                EventStatus::Approved => IcsStatus::Confirmed,
                EventStatus::Pending => IcsStatus::Tentative,
                EventStatus::Rejected => IcsStatus::Cancelled,
            });

            if item.is_full_day() {
                event.all_day(day);
            } else {
                let start = at(tz, day, item.start_time).unwrap_or(item.event_date);
                let end = at(tz, day, item.end_time).unwrap_or(start);
                event.starts(start);
                event.ends(end);
            }
            calendar.push(event);
        }

        calendar.to_string().into_bytes()
    }
}

fn at(tz: Tz, day: chrono::NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&day.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
