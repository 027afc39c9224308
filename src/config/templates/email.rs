pub const CONFIRMATION_SUBJECT: &str = "Confirmed: {{ meeting_title }} on {{ date }}";

pub const CONFIRMATION_BODY: &str = r#"Hi {{ recipient_name }},

I'm happy to confirm that "{{ meeting_title }}" is now on the calendar.

- Date: {{ date }}
- Time: {{ meeting_time }}
- Duration: {{ duration }} minutes
- Participants: {{ participants }}
- Location: {{ location }}

Thank you for your flexibility while we found a time that works for everyone.
Please let me know if anything changes on your side before the meeting.

Best regards,
Scheduling Assistant
"#;

pub const RESCHEDULE_REQUEST_SUBJECT: &str = "Request to reschedule: {{ meeting_title }}";

pub const RESCHEDULE_REQUEST_BODY: &str = r#"Hi {{ recipient_name }},

Unfortunately we need to move "{{ meeting_title }}", currently planned for {{ original_time }}.

Reason: {{ reason }}

Here are some alternative times that could work:
{{ alternative_times }}

I apologize for the inconvenience. If none of these suit you, just reply with a few
times that do and I will do my best to accommodate them.

Best regards,
Scheduling Assistant
"#;

pub const APOLOGY_ALTERNATIVE_SUBJECT: &str = "Apologies regarding {{ meeting_title }}";

pub const APOLOGY_ALTERNATIVE_BODY: &str = r#"Hi {{ recipient_name }},

I'm sorry, but we were not able to lock in a time for "{{ meeting_title }}".

{{ explanation }}

To keep things moving, here is what I'd suggest instead:
{{ alternatives }}

Thank you for your patience; I'm committed to finding something that works.

Best regards,
Scheduling Assistant
"#;

pub const COUNTER_PROPOSAL_SUBJECT: &str = "New time suggestions for {{ meeting_title }}";

pub const COUNTER_PROPOSAL_BODY: &str = r#"Hi {{ recipient_name }},

Thank you for proposing {{ original_time }} for "{{ meeting_title }}".

{{ constraint_explanation }}

Would one of these times work instead?
{{ counter_proposals }}

Happy to adjust further if needed.

Best regards,
Scheduling Assistant
"#;

pub const DECLINE_SUBJECT: &str = "Unable to attend: {{ meeting_title }}";

pub const DECLINE_BODY: &str = r#"Hi {{ recipient_name }},

Thank you for the invitation to "{{ meeting_title }}". Unfortunately I won't be able to attend.

Reason: {{ reason }}

{{ alternatives_suggestion }}

Best regards,
Scheduling Assistant
"#;

pub const NEGOTIATION_SUMMARY_SUBJECT: &str = "Scheduling summary: {{ meeting_title }}";

pub const NEGOTIATION_SUMMARY_BODY: &str = r#"Hello everyone,

Here is the outcome of scheduling "{{ meeting_title }}".

- Final time: {{ final_time }}
- Duration: {{ duration }} minutes
- Participants: {{ all_participants }}
- Negotiation rounds: {{ rounds }}

Thanks to all of you for your flexibility. A calendar invitation will follow.

Best regards,
Scheduling Assistant
"#;
